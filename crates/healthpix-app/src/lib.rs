#![warn(missing_docs)]
//! # healthpix-app
//!
//! ## Purpose
//! Orchestrates session, capture, upload, history, and presentation for
//! `healthpix`.
//!
//! ## Responsibilities
//! - Enforce the session gate before history and upload calls.
//! - Run the capture -> upload -> record-history pipeline.
//! - Cascade logout teardown to the history store and the camera.
//! - Orphan upload results that complete after their session ended.
//! - Provide endpoint configuration, the upload kill switch, status checks,
//!   and shell hook points.
//!
//! ## Data flow
//! Login via [`healthpix_session::SessionGate`] -> camera lifecycle via
//! [`healthpix_capture::CaptureController`] -> pending image uploaded via
//! [`healthpix_upload::UploadClient`] -> report recorded in
//! [`healthpix_history::HistoryStore`] and projected via
//! [`healthpix_presenter::present`].
//!
//! ## Ownership and lifetimes
//! The controller owns every subsystem; owned snapshots cross subsystem
//! boundaries so long-lived stages never alias each other.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Every failure leaves the
//! pipeline recoverable: capture failures land Idle, upload failures keep the
//! pending image so the user retries without recapturing.
//!
//! ## Security and privacy notes
//! - History and upload are refused without a session token.
//! - Orchestration logs go through the `log` facade and never include
//!   tokens, credentials, or image bytes; [`redact_sensitive`] guards
//!   free-form strings.
//! - The `HEALTHPIX_UPLOAD_ENABLED` kill switch stops uploads at runtime.

use std::sync::Arc;

use healthpix_capture::{CaptureController, CaptureEffect, CaptureError};
use healthpix_core::{AnalysisReport, HistoryEntry, ImageBlob, UploadJob};
use healthpix_history::{HistoryClient, HistoryError, HistoryStore, summarize};
use healthpix_presenter::DisplayModel;
use healthpix_session::{Credentials, SessionError, SessionGate};
use healthpix_upload::{UploadClient, UploadError};
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Build-time application version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("HEALTHPIX_VERSION");

/// Returns the app version sourced from the root `VERSION` file.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Resolved endpoints of the consumed external services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Auth service base URL (register/login live under it).
    pub auth_base: String,
    /// Analysis upload endpoint.
    pub upload: String,
    /// History endpoint.
    pub history: String,
    /// Informational status endpoint.
    pub status: String,
}

impl EndpointConfig {
    /// Derives all service endpoints from one HTTPS base URL.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidConfig`] when the base URL does not parse
    /// or does not use HTTPS.
    pub fn from_base(base: &str) -> Result<Self, AppError> {
        let parsed = Url::parse(base)
            .map_err(|error| AppError::InvalidConfig(format!("invalid base url: {error}")))?;
        if parsed.scheme() != "https" {
            return Err(AppError::InvalidConfig(
                "service base url must use https".to_string(),
            ));
        }

        let join = |path: &str| {
            parsed
                .join(path)
                .map(|url| url.to_string())
                .map_err(|error| AppError::InvalidConfig(error.to_string()))
        };

        Ok(Self {
            auth_base: parsed.to_string(),
            upload: join("api/upload")?,
            history: join("api/history")?,
            status: join("api/status")?,
        })
    }

    /// Reads the base URL from `HEALTHPIX_API_BASE`, falling back to
    /// `default_base`.
    ///
    /// # Errors
    /// Propagates [`EndpointConfig::from_base`] validation failures.
    pub fn from_env(default_base: &str) -> Result<Self, AppError> {
        match std::env::var("HEALTHPIX_API_BASE") {
            Ok(base) if !base.trim().is_empty() => Self::from_base(base.trim()),
            _ => Self::from_base(default_base),
        }
    }
}

/// Parses a kill-switch value.
///
/// Semantics:
/// - `None` (unset) => uploads enabled.
/// - `0`, `false`, `off` (case-insensitive) => uploads disabled.
/// - Any other value => uploads enabled.
pub fn upload_enabled_from_value(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

/// Checks the runtime `HEALTHPIX_UPLOAD_ENABLED` kill switch.
pub fn upload_enabled_from_env() -> bool {
    upload_enabled_from_value(std::env::var("HEALTHPIX_UPLOAD_ENABLED").ok().as_deref())
}

/// Redacts common secret markers in log-safe output.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["password", "token", "authorization", "bearer"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let Some(position) = lower.find(key) else {
        return input.to_string();
    };

    let mut value_start = position + key.len();
    let bytes = input.as_bytes();
    while value_start < input.len() && matches!(bytes[value_start], b' ' | b':' | b'=' | b'"') {
        value_start += 1;
    }
    // `Authorization: Bearer <token>` hides the scheme's token, not the word.
    if lower[value_start..].starts_with("bearer ") {
        value_start += "bearer ".len();
    }
    let value_len = input[value_start..]
        .find(|c: char| c.is_whitespace() || c == '"' || c == ',')
        .unwrap_or(input.len() - value_start);
    if value_len == 0 {
        return input.to_string();
    }

    format!(
        "{}<redacted>{}",
        &input[..value_start],
        &input[value_start + value_len..]
    )
}

/// Informational status payload of the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceStatus {
    /// Coarse service state, for example `running`.
    pub ai_status: String,
    /// Service version string.
    #[serde(default)]
    pub version: String,
    /// Service uptime in seconds.
    #[serde(default)]
    pub uptime: u64,
}

/// Abstract transport for the unauthenticated status endpoint.
pub trait StatusTransport: Send + Sync {
    /// Fetches the raw status body.
    ///
    /// # Errors
    /// Returns [`AppError::Network`] when no response was received.
    fn fetch(&self, endpoint: &str) -> Result<String, AppError>;
}

/// Client for the informational status endpoint.
#[derive(Clone)]
pub struct StatusClient {
    endpoint: String,
    transport: Arc<dyn StatusTransport>,
}

impl StatusClient {
    /// Creates a status client; the endpoint is taken as configured.
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn StatusTransport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
        }
    }

    /// Fetches and parses service status.
    ///
    /// # Errors
    /// Returns [`AppError::Network`] or [`AppError::InvalidResponse`].
    pub fn fetch(&self) -> Result<ServiceStatus, AppError> {
        let body = self.transport.fetch(&self.endpoint)?;
        serde_json::from_str(&body).map_err(|error| AppError::InvalidResponse(error.to_string()))
    }
}

/// Hook points exposed to the surrounding application shell.
///
/// All hooks default to no-ops so headless embeddings need no boilerplate.
pub trait ShellHooks: Send + Sync {
    /// Fired after a report was stored in history.
    fn on_new_report(&self, _report: &AnalysisReport) {}

    /// Fired after a successful login.
    fn on_login(&self, _username: &str) {}

    /// Fired after logout teardown completed.
    fn on_logout(&self) {}
}

/// Shell hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ShellHooks for NoopHooks {}

/// Orchestrates the capture-and-upload pipeline behind the session gate.
pub struct AppController {
    gate: SessionGate,
    capture: CaptureController,
    uploader: UploadClient,
    history_client: HistoryClient,
    store: HistoryStore,
    status_client: StatusClient,
    hooks: Arc<dyn ShellHooks>,
    last_report: Option<AnalysisReport>,
}

impl AppController {
    /// Wires the pipeline from its subsystems.
    pub fn new(
        gate: SessionGate,
        capture: CaptureController,
        uploader: UploadClient,
        history_client: HistoryClient,
        status_client: StatusClient,
        hooks: Arc<dyn ShellHooks>,
    ) -> Self {
        Self {
            gate,
            capture,
            uploader,
            history_client,
            store: HistoryStore::new(),
            status_client,
            hooks,
            last_report: None,
        }
    }

    /// Read access to the capture controller for state inspection.
    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    /// Returns the retained history entries, newest first.
    pub fn history(&self) -> &[HistoryEntry] {
        self.store.entries()
    }

    /// Returns the most recent successfully stored report.
    pub fn last_report(&self) -> Option<&AnalysisReport> {
        self.last_report.as_ref()
    }

    /// Returns `true` while a session is held.
    pub fn is_authenticated(&self) -> bool {
        self.gate.is_authenticated()
    }

    /// Registers a new account; no session is created.
    ///
    /// # Errors
    /// Propagates session-layer failures.
    pub fn register(&self, credentials: &Credentials) -> Result<String, AppError> {
        Ok(self.gate.register(credentials)?)
    }

    /// Logs in, fires the login hook, and refreshes history best-effort.
    ///
    /// A failed history fetch right after login is not a login failure; the
    /// store simply stays empty until the next refresh.
    ///
    /// # Errors
    /// Propagates session-layer failures.
    pub fn login(&mut self, credentials: &Credentials) -> Result<(), AppError> {
        let session = self.gate.login(credentials)?;
        let username = session.username.clone();
        info!("session established for {username}");
        self.hooks.on_login(&username);

        if let Err(error) = self.refresh_history() {
            warn!("post-login history refresh failed: {error}");
        }
        Ok(())
    }

    /// Logs out and cascades teardown to history and camera.
    ///
    /// A report or camera bound to a stale token is meaningless, so the
    /// cascade is unconditional and runs even when no session was held.
    pub fn logout(&mut self) {
        let had_session = self.gate.logout().is_some();
        self.store.clear();
        let effects = self.capture.stop();
        self.last_report = None;
        if had_session {
            info!("session closed, released {} capture effects", effects.len());
            self.hooks.on_logout();
        }
    }

    /// Starts the camera. No-op when a stream is already held.
    ///
    /// # Errors
    /// Surfaces permission/device failures; the machine is Idle afterwards.
    pub fn start_camera(&mut self) -> Result<Vec<CaptureEffect>, AppError> {
        debug!("starting camera");
        Ok(self.capture.start()?)
    }

    /// Captures the current frame into the pending image.
    ///
    /// # Errors
    /// Propagates capture-layer failures.
    pub fn capture_photo(&mut self, captured_at_ms: u64) -> Result<Vec<CaptureEffect>, AppError> {
        Ok(self.capture.capture(captured_at_ms)?)
    }

    /// Accepts an externally selected image instead of a camera frame.
    ///
    /// # Errors
    /// Propagates the media-type filter rejection.
    pub fn select_file(&mut self, blob: ImageBlob) -> Result<Vec<CaptureEffect>, AppError> {
        Ok(self.capture.select_file(blob)?)
    }

    /// Discards the pending image and returns to live capture.
    ///
    /// # Errors
    /// Propagates a failed device re-acquisition.
    pub fn retake(&mut self) -> Result<Vec<CaptureEffect>, AppError> {
        Ok(self.capture.retake()?)
    }

    /// Stops the camera; idempotent.
    pub fn stop_camera(&mut self) -> Vec<CaptureEffect> {
        self.capture.stop()
    }

    /// Uploads the pending image and records the resulting report.
    ///
    /// Requires an authorized session and a pending image. On success the
    /// optimistic history entry is prepended and `on_new_report` fires. On
    /// failure the machine stays in Captured with the pending image intact,
    /// so the user can retry without recapturing; no automatic retry happens.
    ///
    /// # Errors
    /// Returns [`AppError::UploadsDisabled`] under the kill switch,
    /// [`AppError::Session`] without a session, [`AppError::NoPendingImage`]
    /// without a captured image, and upload-layer failures otherwise.
    pub fn upload_pending(&mut self, job: &mut UploadJob) -> Result<AnalysisReport, AppError> {
        if !upload_enabled_from_env() {
            return Err(AppError::UploadsDisabled);
        }

        let token = self.gate.authorize()?.to_string();
        let image = self
            .capture
            .pending_image()
            .cloned()
            .ok_or(AppError::NoPendingImage)?;

        job.begin();
        let result = {
            let mut observe = |percent: u8| job.observe_progress(percent);
            self.uploader.upload(&image, &token, &mut observe)
        };

        match result {
            Ok(report) => {
                job.succeed();
                // The session may have ended while the transport ran; an
                // orphaned result is discarded, never stored.
                if self.commit_report(report.clone(), &token) {
                    Ok(report)
                } else {
                    Err(AppError::Session(SessionError::NotAuthenticated))
                }
            }
            Err(error) => {
                job.fail();
                warn!("upload attempt failed: {error}");
                Err(AppError::Upload(error))
            }
        }
    }

    /// Stores a completed upload's report unless its session ended.
    ///
    /// Returns `false` when the report was orphaned (no session, or a
    /// different token than the one the upload started with) and therefore
    /// discarded.
    pub fn commit_report(&mut self, report: AnalysisReport, token_used: &str) -> bool {
        match self.gate.authorize() {
            Ok(token) if token == token_used => {
                self.store.record_local(HistoryEntry {
                    id: report.id.clone(),
                    summary: summarize(&report.result_payload),
                    date: report.timestamp.clone(),
                });
                info!("report {} recorded", report.id);
                self.hooks.on_new_report(&report);
                self.last_report = Some(report);
                true
            }
            _ => {
                debug!("discarding orphaned report {}", report.id);
                false
            }
        }
    }

    /// Fetches server-authoritative history and reconciles the store.
    ///
    /// # Errors
    /// Returns [`AppError::Session`] without a session and propagates
    /// history-layer failures; the store is untouched on failure.
    pub fn refresh_history(&mut self) -> Result<(), AppError> {
        let token = self.gate.authorize()?;
        let entries = self.history_client.fetch(token)?;
        self.store.reconcile(entries);
        Ok(())
    }

    /// Presents the most recent report for display.
    pub fn present_last(&self) -> Option<DisplayModel> {
        self.last_report
            .as_ref()
            .map(|report| healthpix_presenter::present(&report.result_payload))
    }

    /// Checks the informational service status.
    ///
    /// # Errors
    /// Propagates status transport and decode failures.
    pub fn check_status(&self) -> Result<ServiceStatus, AppError> {
        self.status_client.fetch()
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Session subsystem error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Upload subsystem error.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    /// History subsystem error.
    #[error("history error: {0}")]
    History(#[from] HistoryError),
    /// Upload requested without a pending image.
    #[error("no pending image to upload")]
    NoPendingImage,
    /// Uploads disabled by the runtime kill switch.
    #[error("uploads are disabled by HEALTHPIX_UPLOAD_ENABLED")]
    UploadsDisabled,
    /// Configuration value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Network failure outside the typed subsystems.
    #[error("network failure: {0}")]
    Network(String),
    /// Response body violated an informational contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for config derivation, kill switch, and redaction.

    use super::*;

    #[test]
    fn endpoint_config_derives_service_urls() {
        let config = EndpointConfig::from_base("https://api.healthpix.test/").expect("config");
        assert_eq!(config.upload, "https://api.healthpix.test/api/upload");
        assert_eq!(config.history, "https://api.healthpix.test/api/history");
        assert_eq!(config.status, "https://api.healthpix.test/api/status");
    }

    #[test]
    fn endpoint_config_requires_https() {
        assert!(EndpointConfig::from_base("http://api.healthpix.test/").is_err());
        assert!(EndpointConfig::from_base("not a url").is_err());
    }

    #[test]
    fn kill_switch_parses_disable_values() {
        assert!(upload_enabled_from_value(None));
        assert!(upload_enabled_from_value(Some("1")));
        assert!(upload_enabled_from_value(Some("yes")));
        assert!(!upload_enabled_from_value(Some("0")));
        assert!(!upload_enabled_from_value(Some("FALSE")));
        assert!(!upload_enabled_from_value(Some(" off ")));
    }

    #[test]
    fn redaction_strips_secret_markers() {
        let redacted = redact_sensitive("authorization: Bearer abc123");
        assert!(!redacted.contains("abc123"));
        assert!(redacted.contains("<redacted>"));
    }

    #[test]
    fn redaction_keeps_unrelated_trailing_text() {
        let redacted = redact_sensitive("user=alice password=pw123 action=login");
        assert_eq!(redacted, "user=alice password=<redacted> action=login");

        let redacted = redact_sensitive("request failed, token=\"tok-9\", retrying is up to the user");
        assert!(!redacted.contains("tok-9"));
        assert!(redacted.contains("retrying is up to the user"));
    }
}
