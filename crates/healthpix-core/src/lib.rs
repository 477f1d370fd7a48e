#![warn(missing_docs)]
//! # healthpix-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `healthpix` workspace.
//!
//! ## Responsibilities
//! - Represent captured/selected image blobs with their media type.
//! - Enforce the image-only media-type filter and the upload size limit.
//! - Model per-attempt upload jobs with terminal success/failure states.
//! - Represent immutable analysis reports and derived history entries.
//!
//! ## Data flow
//! Capture code emits [`ImageBlob`] values. The upload layer validates them
//! against [`MAX_UPLOAD_BYTES`] and the media filter, tracks one [`UploadJob`]
//! per attempt, and yields an [`AnalysisReport`] that the history layer turns
//! into a [`HistoryEntry`].
//!
//! ## Ownership and lifetimes
//! Blobs and reports own their backing buffers (`Vec<u8>`, `String`) so
//! pipeline stages never borrow from each other across suspension points.
//!
//! ## Error model
//! Policy violations (non-image media type, oversize payload, empty blob)
//! return [`CoreError`] variants with caller-actionable categorization.
//!
//! ## Security and privacy notes
//! This crate never logs image bytes or tokens. Report identifiers and image
//! references are content-derived, not user-derived.
//!
//! ## Example
//! ```rust
//! use healthpix_core::{ImageBlob, UploadJob, UploadStatus};
//!
//! let blob = ImageBlob::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg", "selfie.jpg").unwrap();
//! blob.ensure_uploadable().unwrap();
//!
//! let mut job = UploadJob::new();
//! job.begin();
//! job.observe_progress(40);
//! job.succeed();
//! assert_eq!(job.status(), UploadStatus::Succeeded);
//! assert_eq!(job.progress(), 100);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted upload payload size in bytes (10 MiB).
///
/// The origin service enforces the same limit; the client-side check exists
/// to fail before any bytes hit the wire, not as a security boundary.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Returns `true` when `media_type` names an image media type.
///
/// The filter matches the `image/*` family and nothing else; parameters such
/// as `;charset=` are not expected on image types and are rejected with the
/// rest of the non-image space.
pub fn is_image_media_type(media_type: &str) -> bool {
    let normalized = media_type.trim().to_ascii_lowercase();
    normalized.starts_with("image/") && normalized.len() > "image/".len()
}

/// An owned still image together with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    /// Encoded image bytes.
    bytes: Vec<u8>,
    /// Declared media type, for example `image/jpeg`.
    media_type: String,
    /// Suggested file name used for the multipart part.
    file_name: String,
}

impl ImageBlob {
    /// Constructs a blob from bytes and a declared media type.
    ///
    /// The media type is carried as declared; the image-only filter is applied
    /// at the capture and upload boundaries, not at construction, so that
    /// rejected selections can be represented and tested.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyImage`] when `bytes` is empty.
    pub fn new(
        bytes: Vec<u8>,
        media_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::EmptyImage);
        }

        Ok(Self {
            bytes,
            media_type: media_type.into(),
            file_name: file_name.into(),
        })
    }

    /// Returns the encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` when the blob holds no bytes.
    ///
    /// Construction forbids empty blobs, so this exists only for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the declared media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the suggested file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Re-checks upload policy for this blob.
    ///
    /// # Errors
    /// Returns [`CoreError::PayloadTooLarge`] when the blob exceeds
    /// [`MAX_UPLOAD_BYTES`].
    /// Returns [`CoreError::UnsupportedMediaType`] when the media type fails
    /// the image filter.
    pub fn ensure_uploadable(&self) -> Result<(), CoreError> {
        if !is_image_media_type(&self.media_type) {
            return Err(CoreError::UnsupportedMediaType(self.media_type.clone()));
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(CoreError::PayloadTooLarge {
                actual: self.bytes.len(),
                limit: MAX_UPLOAD_BYTES,
            });
        }

        Ok(())
    }
}

/// Lifecycle status of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Created but not yet sent.
    Pending,
    /// Transport is currently streaming the payload.
    InFlight,
    /// Terminal: server accepted the payload.
    Succeeded,
    /// Terminal: the attempt failed and will not be retried automatically.
    Failed,
}

/// Per-attempt upload tracker with monotonic progress.
///
/// One job is created for every upload attempt. `Succeeded` and `Failed` are
/// terminal; later transition calls are ignored so racing completion signals
/// cannot resurrect a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    progress: u8,
    status: UploadStatus,
}

impl UploadJob {
    /// Creates a job in `Pending` state with zero progress.
    pub fn new() -> Self {
        Self {
            progress: 0,
            status: UploadStatus::Pending,
        }
    }

    /// Returns current progress percentage in `0..=100`.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Returns `true` once the job reached `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, UploadStatus::Succeeded | UploadStatus::Failed)
    }

    /// Marks the job in flight. Ignored once terminal.
    pub fn begin(&mut self) {
        if !self.is_terminal() {
            self.status = UploadStatus::InFlight;
        }
    }

    /// Records a progress observation.
    ///
    /// Progress is monotonic: regressions are dropped and values above 100
    /// are clamped. Observations after a terminal transition are ignored.
    pub fn observe_progress(&mut self, percent: u8) {
        if self.is_terminal() {
            return;
        }
        let clamped = percent.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }

    /// Terminal success transition; forces progress to 100.
    pub fn succeed(&mut self) {
        if !self.is_terminal() {
            self.progress = 100;
            self.status = UploadStatus::Succeeded;
        }
    }

    /// Terminal failure transition; progress stays where it stopped.
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            self.status = UploadStatus::Failed;
        }
    }
}

impl Default for UploadJob {
    fn default() -> Self {
        Self::new()
    }
}

/// One analysis result returned by the remote scoring service.
///
/// Reports are immutable once created: all fields are set at construction and
/// only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Client-assigned report identifier.
    pub id: String,
    /// Raw result payload; plain text or a structured JSON document.
    pub result_payload: String,
    /// Server-issued timestamp, carried opaquely (RFC 3339 in practice).
    pub timestamp: String,
    /// Content fingerprint of the uploaded image.
    pub source_image_ref: String,
}

/// One row of the bounded per-user history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Entry identifier; unique within one user's history.
    pub id: String,
    /// Short summary derived from the result payload.
    pub summary: String,
    /// Timestamp string, carried opaquely.
    pub date: String,
}

/// Error type for core policy and validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Image blob has no bytes.
    #[error("image blob is empty")]
    EmptyImage,
    /// Media type fails the image-only filter.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    /// Payload exceeds the upload size limit.
    #[error("payload too large: {actual} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
}
