#![warn(missing_docs)]
//! # healthpix-capture
//!
//! ## Purpose
//! Implements the camera lifecycle state machine and still-image capture for
//! `healthpix`.
//!
//! ## Responsibilities
//! - Define a backend-agnostic camera device trait with an owned stream model.
//! - Drive the `Idle -> Starting -> Active -> Captured` lifecycle with
//!   explicit transitions that return emitted resource effects.
//! - Crop captured frames to a centered square and encode them to JPEG.
//! - Issue and revoke preview handles with an at-most-one-live invariant.
//!
//! ## Data flow
//! [`CaptureController::start`] acquires a [`CameraStream`] from the injected
//! [`CameraBackend`] -> [`CaptureController::capture`] reads one [`Frame`],
//! crops and encodes it into a [`healthpix_core::ImageBlob`], and issues a
//! [`PreviewHandle`] -> the upload layer consumes the pending blob.
//!
//! ## Ownership and lifetimes
//! The controller exclusively owns the capture session: the device stream,
//! the pending image, and the live preview handle. Nothing borrows session
//! state across transitions.
//!
//! ## Error model
//! Permission and device failures are returned as [`CaptureError`] values and
//! always leave the machine in a well-defined state (Idle on device loss);
//! they never panic into caller state. Teardown is idempotent and infallible.
//!
//! ## Security and privacy notes
//! Frame bytes never leave this crate except as the encoded pending image;
//! nothing here logs pixel data.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use healthpix_capture::{CameraState, CaptureController, SyntheticCameraBackend};
//!
//! let backend = Arc::new(SyntheticCameraBackend::new(64, 48));
//! let mut controller = CaptureController::new(backend.clone());
//! controller.start().unwrap();
//! controller.capture(1_000).unwrap();
//! assert_eq!(controller.state(), CameraState::Captured);
//! controller.stop();
//! assert_eq!(backend.live_tracks(), 0);
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use healthpix_core::{ImageBlob, is_image_media_type};
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

/// JPEG quality used for captured stills, inside the 90-95 policy band.
pub const CAPTURE_JPEG_QUALITY: u8 = 92;

/// Camera lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// No device resources held.
    Idle,
    /// Device access requested, grant pending.
    Starting,
    /// Live stream held and bound; capture is legal.
    Active,
    /// A pending image exists; the stream may still be held for retake.
    Captured,
}

/// Resource effect emitted by a lifecycle transition.
///
/// Transitions return the effects they performed so callers and tests can
/// observe resource movement without reaching into session internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEffect {
    /// A device stream was acquired from the backend.
    DeviceAcquired,
    /// The given number of device tracks were released.
    TracksReleased(usize),
    /// A new preview handle was issued.
    PreviewIssued(u64),
    /// A previously live preview handle was revoked.
    PreviewRevoked(u64),
    /// A pending image was discarded without being uploaded.
    ImageDiscarded,
}

/// One raw frame read from a camera stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA pixel buffer (`width * height * 4` bytes).
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Constructs a validated frame.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidFrameShape`] when the buffer length is
    /// not exactly `width * height * 4` or the geometry is degenerate.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrameShape {
                expected: 0,
                actual: rgba.len(),
            });
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(CaptureError::InvalidFrameShape {
                expected: usize::MAX,
                actual: rgba.len(),
            })?;
        if rgba.len() != expected {
            return Err(CaptureError::InvalidFrameShape {
                expected,
                actual: rgba.len(),
            });
        }

        Ok(Self {
            width,
            height,
            rgba,
        })
    }
}

/// Crops a frame to a centered square of side `min(width, height)`.
///
/// Square output is policy regardless of the source aspect ratio, so portrait
/// and landscape devices produce identical report geometry.
pub fn crop_centered_square(frame: &Frame) -> Frame {
    let side = frame.width.min(frame.height);
    let offset_x = ((frame.width - side) / 2) as usize;
    let offset_y = ((frame.height - side) / 2) as usize;

    let side_px = side as usize;
    let src_stride = frame.width as usize * 4;
    let mut rgba = Vec::with_capacity(side_px * side_px * 4);

    for y in 0..side_px {
        let row_start = (offset_y + y) * src_stride + offset_x * 4;
        rgba.extend_from_slice(&frame.rgba[row_start..row_start + side_px * 4]);
    }

    Frame {
        width: side,
        height: side,
        rgba,
    }
}

/// Encodes an RGBA frame to JPEG bytes at the given quality.
///
/// The alpha channel is dropped before encoding; camera frames are opaque.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when the codec rejects the frame.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut rgb = Vec::with_capacity(frame.rgba.len() / 4 * 3);
    for pixel in frame.rgba.chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode(&rgb, frame.width, frame.height, image::ExtendedColorType::Rgb8)
        .map_err(|error| CaptureError::Encode(error.to_string()))?;

    Ok(encoded)
}

/// An acquired camera stream owning one or more device tracks.
pub trait CameraStream: Send {
    /// Reads the current frame from the live stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceUnavailable`] when the device was lost.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Returns the number of device tracks currently held.
    fn track_count(&self) -> usize;

    /// Releases every acquired track. Must be idempotent and must not fail.
    fn stop_tracks(&mut self);
}

/// Trait implemented by concrete camera device providers.
pub trait CameraBackend: Send + Sync {
    /// Requests device access and opens a live stream.
    ///
    /// # Errors
    /// Returns [`CaptureError::PermissionDenied`] when the user or platform
    /// refused access, [`CaptureError::DeviceUnavailable`] for device faults.
    fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// Behavior knob for the synthetic backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticAccess {
    /// Grant access and serve deterministic frames.
    Grant,
    /// Refuse access as a permission denial.
    Deny,
    /// Fail access as a device fault.
    Unavailable,
}

/// Deterministic camera backend for tests and CI.
///
/// Tracks acquired by its streams are counted on a shared counter so tests
/// can assert that teardown released everything.
#[derive(Debug)]
pub struct SyntheticCameraBackend {
    width: u32,
    height: u32,
    access: SyntheticAccess,
    live_tracks: Arc<AtomicUsize>,
    frame_sequence: Arc<AtomicUsize>,
}

impl SyntheticCameraBackend {
    /// Creates a granting backend serving frames of the given geometry.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            access: SyntheticAccess::Grant,
            live_tracks: Arc::new(AtomicUsize::new(0)),
            frame_sequence: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a backend with explicit access behavior.
    pub fn with_access(width: u32, height: u32, access: SyntheticAccess) -> Self {
        Self {
            access,
            ..Self::new(width, height)
        }
    }

    /// Returns the number of device tracks currently held across streams.
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }
}

impl CameraBackend for SyntheticCameraBackend {
    fn open(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        match self.access {
            SyntheticAccess::Grant => {
                self.live_tracks.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(SyntheticCameraStream {
                    width: self.width,
                    height: self.height,
                    tracks: 1,
                    live_tracks: Arc::clone(&self.live_tracks),
                    frame_sequence: Arc::clone(&self.frame_sequence),
                }))
            }
            SyntheticAccess::Deny => Err(CaptureError::PermissionDenied(
                "camera access was denied".to_string(),
            )),
            SyntheticAccess::Unavailable => Err(CaptureError::DeviceUnavailable(
                "no camera device is available".to_string(),
            )),
        }
    }
}

struct SyntheticCameraStream {
    width: u32,
    height: u32,
    tracks: usize,
    live_tracks: Arc<AtomicUsize>,
    frame_sequence: Arc<AtomicUsize>,
}

impl CameraStream for SyntheticCameraStream {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.tracks == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "stream tracks were already released".to_string(),
            ));
        }

        let sequence = self.frame_sequence.fetch_add(1, Ordering::SeqCst);
        let byte = (sequence % 251) as u8;
        let rgba = vec![byte; self.width as usize * self.height as usize * 4];
        Frame::new(self.width, self.height, rgba)
    }

    fn track_count(&self) -> usize {
        self.tracks
    }

    fn stop_tracks(&mut self) {
        if self.tracks > 0 {
            self.live_tracks.fetch_sub(self.tracks, Ordering::SeqCst);
            self.tracks = 0;
        }
    }
}

/// A revocable handle to the preview surface for the pending image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewHandle(u64);

impl PreviewHandle {
    /// Returns the numeric handle identity.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Registry issuing and revoking preview handles.
///
/// Invariant:
/// - The controller holds at most one live handle; replacing a handle revokes
///   the old one before the new one is issued.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next_id: u64,
    live: BTreeSet<u64>,
}

impl PreviewRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new live handle.
    pub fn issue(&mut self) -> PreviewHandle {
        self.next_id += 1;
        self.live.insert(self.next_id);
        PreviewHandle(self.next_id)
    }

    /// Revokes a handle. Revoking an already-revoked handle is a no-op.
    pub fn revoke(&mut self, handle: PreviewHandle) {
        self.live.remove(&handle.0);
    }

    /// Returns the number of currently live handles.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Owns the capture session and drives the camera lifecycle.
///
/// See the crate docs for the state diagram. All transition methods return
/// the list of [`CaptureEffect`]s they performed.
pub struct CaptureController {
    state: CameraState,
    stream: Option<Box<dyn CameraStream>>,
    pending_image: Option<ImageBlob>,
    preview: Option<PreviewHandle>,
    previews: PreviewRegistry,
    backend: Arc<dyn CameraBackend>,
}

impl CaptureController {
    /// Creates an idle controller over the given device backend.
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            state: CameraState::Idle,
            stream: None,
            pending_image: None,
            preview: None,
            previews: PreviewRegistry::new(),
            backend,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Returns the pending captured/selected image, if any.
    pub fn pending_image(&self) -> Option<&ImageBlob> {
        self.pending_image.as_ref()
    }

    /// Returns the live preview handle, if any.
    pub fn preview(&self) -> Option<PreviewHandle> {
        self.preview
    }

    /// Returns the number of live preview handles (0 or 1 by invariant).
    pub fn live_preview_count(&self) -> usize {
        self.previews.live_count()
    }

    /// Returns the number of device tracks currently held.
    pub fn held_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |stream| stream.track_count())
    }

    /// Requests device access and binds the live stream.
    ///
    /// Starting while a stream is already held is a no-op that returns no
    /// effects; the device is never double-acquired.
    ///
    /// # Errors
    /// Returns [`CaptureError::PermissionDenied`] or
    /// [`CaptureError::DeviceUnavailable`] and leaves the machine Idle.
    pub fn start(&mut self) -> Result<Vec<CaptureEffect>, CaptureError> {
        if self.stream.is_some() {
            return Ok(Vec::new());
        }

        self.state = CameraState::Starting;
        match self.backend.open() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = CameraState::Active;
                Ok(vec![CaptureEffect::DeviceAcquired])
            }
            Err(error) => {
                self.state = CameraState::Idle;
                Err(error)
            }
        }
    }

    /// Captures the current frame into a pending JPEG image.
    ///
    /// Produces exactly one new blob and one new preview handle, revoking any
    /// prior handle first. The stream stays held so a retake does not need a
    /// fresh permission request.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidState`] outside `Active`.
    /// Returns [`CaptureError::DeviceUnavailable`] when the frame read fails
    /// and [`CaptureError::Encode`] when encoding fails; either way the
    /// stream is released and the machine returns to Idle.
    pub fn capture(&mut self, captured_at_ms: u64) -> Result<Vec<CaptureEffect>, CaptureError> {
        if self.state != CameraState::Active {
            return Err(CaptureError::InvalidState {
                operation: "capture",
                state: self.state,
            });
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(CaptureError::InvalidState {
                operation: "capture",
                state: self.state,
            });
        };

        let frame = match stream.read_frame() {
            Ok(frame) => frame,
            Err(error) => return Err(self.abort_capture(error)),
        };

        let square = crop_centered_square(&frame);
        let encoded = match encode_jpeg(&square, CAPTURE_JPEG_QUALITY) {
            Ok(encoded) => encoded,
            Err(error) => return Err(self.abort_capture(error)),
        };
        let blob = match ImageBlob::new(
            encoded,
            "image/jpeg",
            format!("selfie_{captured_at_ms}.jpg"),
        ) {
            Ok(blob) => blob,
            Err(error) => {
                return Err(self.abort_capture(CaptureError::Encode(error.to_string())));
            }
        };

        let mut effects = Vec::new();
        if let Some(old) = self.preview.take() {
            self.previews.revoke(old);
            effects.push(CaptureEffect::PreviewRevoked(old.id()));
        }
        let handle = self.previews.issue();
        self.preview = Some(handle);
        self.pending_image = Some(blob);
        self.state = CameraState::Captured;
        effects.push(CaptureEffect::PreviewIssued(handle.id()));

        Ok(effects)
    }

    /// Accepts an externally selected image, bypassing the camera.
    ///
    /// Legal in any state; the device stream (if held) is untouched.
    ///
    /// # Errors
    /// Returns [`CaptureError::UnsupportedMediaType`] for non-image blobs.
    pub fn select_file(&mut self, blob: ImageBlob) -> Result<Vec<CaptureEffect>, CaptureError> {
        if !is_image_media_type(blob.media_type()) {
            return Err(CaptureError::UnsupportedMediaType(
                blob.media_type().to_string(),
            ));
        }

        let mut effects = Vec::new();
        if let Some(old) = self.preview.take() {
            self.previews.revoke(old);
            effects.push(CaptureEffect::PreviewRevoked(old.id()));
        }
        let handle = self.previews.issue();
        self.preview = Some(handle);
        self.pending_image = Some(blob);
        self.state = CameraState::Captured;
        effects.push(CaptureEffect::PreviewIssued(handle.id()));

        Ok(effects)
    }

    /// Discards the pending image and returns to live capture.
    ///
    /// Returns to `Active` when a stream is still held, otherwise re-invokes
    /// [`CaptureController::start`].
    ///
    /// # Errors
    /// Propagates [`CaptureController::start`] failures when the stream must
    /// be re-acquired.
    pub fn retake(&mut self) -> Result<Vec<CaptureEffect>, CaptureError> {
        let mut effects = self.release_preview_and_image();

        if self.stream.is_some() {
            self.state = CameraState::Active;
            return Ok(effects);
        }

        self.state = CameraState::Idle;
        effects.extend(self.start()?);
        Ok(effects)
    }

    /// Idempotent teardown: releases every track and the preview handle.
    ///
    /// Runs on every teardown path (explicit stop, disposal, session logout)
    /// and always lands in `Idle`. Never fails; releasing already-released
    /// resources is swallowed.
    pub fn stop(&mut self) -> Vec<CaptureEffect> {
        let mut effects = self.release_stream();
        effects.extend(self.release_preview_and_image());
        self.state = CameraState::Idle;
        effects
    }

    // Any capture failure releases everything and lands Idle.
    fn abort_capture(&mut self, error: CaptureError) -> CaptureError {
        self.release_stream();
        self.release_preview_and_image();
        self.state = CameraState::Idle;
        error
    }

    fn release_stream(&mut self) -> Vec<CaptureEffect> {
        let mut effects = Vec::new();
        if let Some(mut stream) = self.stream.take() {
            let tracks = stream.track_count();
            stream.stop_tracks();
            effects.push(CaptureEffect::TracksReleased(tracks));
        }
        effects
    }

    fn release_preview_and_image(&mut self) -> Vec<CaptureEffect> {
        let mut effects = Vec::new();
        if let Some(handle) = self.preview.take() {
            self.previews.revoke(handle);
            effects.push(CaptureEffect::PreviewRevoked(handle.id()));
        }
        if self.pending_image.take().is_some() {
            effects.push(CaptureEffect::ImageDiscarded);
        }
        effects
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        // Disposal is a teardown path like any other.
        let _ = self.stop();
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// User or platform refused device access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    /// Device is missing or failed at runtime.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Selected file fails the image-only filter.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    /// Operation is not legal in the current state.
    #[error("operation '{operation}' is not legal in state {state:?}")]
    InvalidState {
        /// Name of the refused operation.
        operation: &'static str,
        /// State the machine was in.
        state: CameraState,
    },
    /// Frame buffer does not match its declared geometry.
    #[error("invalid frame shape: expected {expected} bytes, got {actual}")]
    InvalidFrameShape {
        /// Expected RGBA byte count.
        expected: usize,
        /// Actual RGBA byte count.
        actual: usize,
    },
    /// JPEG encoding failed.
    #[error("frame encoding failed: {0}")]
    Encode(String),
}
