#![warn(missing_docs)]
//! # healthpix-upload
//!
//! ## Purpose
//! Packages pending images into authorized multipart requests and maps
//! transport outcomes to typed failures.
//!
//! ## Responsibilities
//! - Pre-validate payload size and media type before any transport call.
//! - Build the multipart/form-data envelope with the single `file` part.
//! - Drive strictly ordered, monotonic progress callbacks.
//! - Parse the analysis service success body into an
//!   [`healthpix_core::AnalysisReport`].
//!
//! ## Data flow
//! Pending [`healthpix_core::ImageBlob`] -> policy pre-checks ->
//! [`UploadEnvelope`] -> injected [`UploadTransport`] -> response mapping ->
//! [`healthpix_core::AnalysisReport`].
//!
//! ## Ownership and lifetimes
//! Envelopes own their body bytes so transports can stream them without
//! borrowing from the capture session.
//!
//! ## Error model
//! Every failure is terminal for its attempt and categorized as
//! [`UploadError`]; the client never retries on its own. The store is not
//! mutated here; the caller wires successful reports into history.
//!
//! ## Security and privacy notes
//! Bearer tokens travel only inside the envelope headers and are never
//! logged or embedded in error messages.
//!
//! ## Example
//! ```rust
//! use healthpix_upload::image_fingerprint;
//!
//! let fingerprint = image_fingerprint(&[0xFF, 0xD8, 0xFF]);
//! assert_eq!(fingerprint.len(), 64);
//! ```

use healthpix_core::{AnalysisReport, CoreError, ImageBlob, MAX_UPLOAD_BYTES};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Multipart field name required by the analysis service.
pub const UPLOAD_FIELD_NAME: &str = "file";

/// Computes the sha256 content fingerprint of an image, hex encoded.
///
/// The fingerprint is used as the report's `source_image_ref` and as the
/// stable component of client-assigned report identifiers.
pub fn image_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// One fully assembled upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEnvelope {
    /// Target endpoint URL.
    pub endpoint: String,
    /// Bearer token attached as `Authorization: Bearer <token>`.
    pub bearer_token: String,
    /// Value of the `Content-Type` header including the boundary.
    pub content_type: String,
    /// Encoded multipart body.
    pub body: Vec<u8>,
}

/// Builds a multipart/form-data body with a single `file` part.
fn multipart_body(blob: &ImageBlob, boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(blob.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{UPLOAD_FIELD_NAME}\"; filename=\"{}\"\r\n",
            blob.file_name()
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", blob.media_type()).as_bytes());
    body.extend_from_slice(blob.bytes());
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..24)
        .map(|_| {
            let alphabet = b"abcdefghijklmnopqrstuvwxyz0123456789";
            alphabet[rng.random_range(0..alphabet.len())] as char
        })
        .collect();
    format!("healthpix-{suffix}")
}

fn local_report_id(fingerprint: &str) -> String {
    let mut rng = rand::rng();
    let suffix: u16 = rng.random();
    format!("{}-{suffix:04x}", &fingerprint[..12])
}

/// Raw response surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Enforces monotonic non-decreasing progress for one upload attempt.
///
/// Transports report raw percentages through [`ProgressReporter::report`];
/// regressions are dropped and values above 100 are clamped, so the observer
/// only ever sees an ordered `0..=100` sequence.
pub struct ProgressReporter<'a> {
    observer: &'a mut dyn FnMut(u8),
    last_percent: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    /// Wraps an observer callback.
    pub fn new(observer: &'a mut dyn FnMut(u8)) -> Self {
        Self {
            observer,
            last_percent: None,
        }
    }

    /// Reports a progress observation, filtered to stay monotonic.
    pub fn report(&mut self, percent: u8) {
        let clamped = percent.min(100);
        if self.last_percent.is_some_and(|last| clamped <= last) {
            return;
        }
        self.last_percent = Some(clamped);
        (self.observer)(clamped);
    }

    /// Emits the terminal 100% observation on success.
    pub fn complete(&mut self) {
        self.report(100);
    }

    /// Returns the last emitted percentage, if any.
    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }
}

/// Abstract transport used by the upload client.
pub trait UploadTransport: Send + Sync {
    /// Sends one envelope, reporting progress while streaming the body.
    ///
    /// # Errors
    /// Returns [`UploadError::Network`] when no response was received.
    /// Non-2xx responses are returned as `Ok` with their status code; the
    /// client maps them to [`UploadError::Server`].
    fn send(
        &self,
        envelope: &UploadEnvelope,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<TransportResponse, UploadError>;
}

/// Success body of the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct UploadResponseBody {
    status: String,
    result: String,
    timestamp: String,
}

/// Error body shape used by the analysis service for failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Upload client validating policy and executing one attempt per call.
#[derive(Clone)]
pub struct UploadClient {
    endpoint: String,
    transport: std::sync::Arc<dyn UploadTransport>,
}

impl UploadClient {
    /// Creates a validated upload client.
    ///
    /// # Errors
    /// Returns [`UploadError::InvalidEndpoint`] when the URL does not parse
    /// or does not use HTTPS.
    pub fn new(
        endpoint: impl Into<String>,
        transport: std::sync::Arc<dyn UploadTransport>,
    ) -> Result<Self, UploadError> {
        let endpoint = endpoint.into();
        let parsed = Url::parse(&endpoint)
            .map_err(|error| UploadError::InvalidEndpoint(format!("invalid upload url: {error}")))?;
        if parsed.scheme() != "https" {
            return Err(UploadError::InvalidEndpoint(
                "upload endpoint must use https".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Uploads one image and returns the resulting analysis report.
    ///
    /// Pre-checks run before any transport call, so an oversize or non-image
    /// payload never touches the network. Progress observations arrive
    /// through `observer` as a monotonic `0..=100` sequence; success forces a
    /// terminal 100.
    ///
    /// # Errors
    /// Returns [`UploadError::PayloadTooLarge`] or
    /// [`UploadError::UnsupportedMediaType`] from the pre-checks,
    /// [`UploadError::Network`] when the transport got no response,
    /// [`UploadError::Server`] for non-2xx responses, and
    /// [`UploadError::InvalidResponse`] when a 2xx body violates the contract.
    /// All are terminal for this attempt; retry is a fresh user action.
    pub fn upload(
        &self,
        image: &ImageBlob,
        token: &str,
        observer: &mut dyn FnMut(u8),
    ) -> Result<AnalysisReport, UploadError> {
        image.ensure_uploadable().map_err(UploadError::from_policy)?;

        let fingerprint = image_fingerprint(image.bytes());
        let boundary = random_boundary();
        let envelope = UploadEnvelope {
            endpoint: self.endpoint.clone(),
            bearer_token: token.to_string(),
            content_type: format!("multipart/form-data; boundary={boundary}"),
            body: multipart_body(image, &boundary),
        };

        let mut progress = ProgressReporter::new(observer);
        progress.report(0);

        let response = self.transport.send(&envelope, &mut progress)?;
        if !(200..300).contains(&response.status) {
            let message = serde_json::from_str::<ErrorBody>(&response.body)
                .map(|body| body.message)
                .unwrap_or_else(|_| response.body.clone());
            return Err(UploadError::Server {
                status: response.status,
                message,
            });
        }

        let body: UploadResponseBody = serde_json::from_str(&response.body)
            .map_err(|error| UploadError::InvalidResponse(error.to_string()))?;
        if body.status != "success" {
            return Err(UploadError::InvalidResponse(format!(
                "unexpected response status field: {}",
                body.status
            )));
        }

        progress.complete();

        Ok(AnalysisReport {
            id: local_report_id(&fingerprint),
            result_payload: body.result,
            timestamp: body.timestamp,
            source_image_ref: fingerprint,
        })
    }
}

/// Upload layer error type.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Endpoint violates URL or transport-security requirements.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Payload exceeds the 10 MiB limit; rejected before transmission.
    #[error("payload too large: {actual} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        actual: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// Payload fails the image-only filter; rejected before transmission.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    /// Transport produced no response at all.
    #[error("network failure: {0}")]
    Network(String),
    /// Service answered with a non-2xx status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, verbatim.
        message: String,
    },
    /// A 2xx body did not match the response contract.
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    fn from_policy(error: CoreError) -> Self {
        match error {
            CoreError::PayloadTooLarge { actual, limit } => {
                UploadError::PayloadTooLarge { actual, limit }
            }
            CoreError::UnsupportedMediaType(media_type) => {
                UploadError::UnsupportedMediaType(media_type)
            }
            CoreError::EmptyImage => {
                UploadError::UnsupportedMediaType("empty payload".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for policy pre-checks, envelope layout, and progress order.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CannedTransport {
        response: TransportResponse,
        steps: Vec<u8>,
        calls: AtomicUsize,
    }

    impl CannedTransport {
        fn success(result: &str) -> Self {
            Self {
                response: TransportResponse {
                    status: 200,
                    body: format!(
                        "{{\"status\":\"success\",\"result\":\"{result}\",\"timestamp\":\"2026-08-29T10:00:00Z\"}}"
                    ),
                },
                steps: vec![25, 50, 75],
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl UploadTransport for CannedTransport {
        fn send(
            &self,
            _envelope: &UploadEnvelope,
            progress: &mut ProgressReporter<'_>,
        ) -> Result<TransportResponse, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for step in &self.steps {
                progress.report(*step);
            }
            Ok(self.response.clone())
        }
    }

    fn jpeg_blob(len: usize) -> ImageBlob {
        ImageBlob::new(vec![0xAB; len], "image/jpeg", "selfie.jpg").expect("blob should build")
    }

    #[test]
    fn client_requires_https_endpoint() {
        let transport = Arc::new(CannedTransport::success("ok"));
        assert!(UploadClient::new("http://api.healthpix.test/api/upload", transport).is_err());
    }

    #[test]
    fn oversize_payload_is_rejected_before_transport() {
        let transport = Arc::new(CannedTransport::success("ok"));
        let client = UploadClient::new(
            "https://api.healthpix.test/api/upload",
            transport.clone(),
        )
        .expect("client should build");

        let blob = jpeg_blob(MAX_UPLOAD_BYTES + 1);
        let mut sink = |_percent: u8| {};
        assert!(matches!(
            client.upload(&blob, "token", &mut sink),
            Err(UploadError::PayloadTooLarge { .. })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_image_payload_is_rejected_before_transport() {
        let transport = Arc::new(CannedTransport::success("ok"));
        let client = UploadClient::new(
            "https://api.healthpix.test/api/upload",
            transport.clone(),
        )
        .expect("client should build");

        let blob = ImageBlob::new(vec![1, 2, 3], "text/plain", "notes.txt")
            .expect("blob should build");
        let mut sink = |_percent: u8| {};
        assert!(matches!(
            client.upload(&blob, "token", &mut sink),
            Err(UploadError::UnsupportedMediaType(_))
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn successful_upload_yields_report_and_full_progress() {
        let transport = Arc::new(CannedTransport::success("all clear"));
        let client = UploadClient::new("https://api.healthpix.test/api/upload", transport)
            .expect("client should build");

        let blob = jpeg_blob(64);
        let mut observed = Vec::new();
        let mut sink = |percent: u8| observed.push(percent);
        let report = client
            .upload(&blob, "token", &mut sink)
            .expect("upload should succeed");

        assert_eq!(report.result_payload, "all clear");
        assert_eq!(report.source_image_ref, image_fingerprint(blob.bytes()));
        assert_eq!(observed, vec![0, 25, 50, 75, 100]);
    }

    #[test]
    fn regressive_transport_progress_stays_monotonic() {
        struct RegressiveTransport;
        impl UploadTransport for RegressiveTransport {
            fn send(
                &self,
                _envelope: &UploadEnvelope,
                progress: &mut ProgressReporter<'_>,
            ) -> Result<TransportResponse, UploadError> {
                for step in [10, 60, 30, 60, 90, 250] {
                    progress.report(step);
                }
                Ok(TransportResponse {
                    status: 200,
                    body: "{\"status\":\"success\",\"result\":\"ok\",\"timestamp\":\"t\"}"
                        .to_string(),
                })
            }
        }

        let client = UploadClient::new(
            "https://api.healthpix.test/api/upload",
            Arc::new(RegressiveTransport),
        )
        .expect("client should build");

        let mut observed = Vec::new();
        let mut sink = |percent: u8| observed.push(percent);
        client
            .upload(&jpeg_blob(16), "token", &mut sink)
            .expect("upload should succeed");

        assert_eq!(observed, vec![0, 10, 60, 90, 100]);
        assert!(observed.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn server_error_surfaces_status_and_message() {
        struct FailingTransport;
        impl UploadTransport for FailingTransport {
            fn send(
                &self,
                _envelope: &UploadEnvelope,
                _progress: &mut ProgressReporter<'_>,
            ) -> Result<TransportResponse, UploadError> {
                Ok(TransportResponse {
                    status: 500,
                    body: "{\"message\":\"processing failed\"}".to_string(),
                })
            }
        }

        let client = UploadClient::new(
            "https://api.healthpix.test/api/upload",
            Arc::new(FailingTransport),
        )
        .expect("client should build");

        let mut sink = |_percent: u8| {};
        let error = client
            .upload(&jpeg_blob(16), "token", &mut sink)
            .expect_err("upload should fail");
        assert!(matches!(
            error,
            UploadError::Server { status: 500, ref message } if message == "processing failed"
        ));
    }

    #[test]
    fn envelope_carries_file_part_and_bearer_token() {
        let blob = jpeg_blob(8);
        let body = multipart_body(&blob, "healthpix-test");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"file\""));
        assert!(text.contains("filename=\"selfie.jpg\""));
        assert!(text.contains("Content-Type: image/jpeg"));
        assert!(text.ends_with("--healthpix-test--\r\n"));
    }
}
