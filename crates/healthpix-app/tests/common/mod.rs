//! Shared fixtures for app integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use healthpix_app::{AppController, AppError, NoopHooks, StatusClient, StatusTransport};
use healthpix_capture::{CaptureController, SyntheticCameraBackend};
use healthpix_core::ImageBlob;
use healthpix_history::{HistoryClient, HistoryError, HistoryTransport};
use healthpix_session::{
    AuthRequest, AuthTransport, Credentials, LoginResponse, RegisterResponse, SessionError,
    SessionGate,
};
use healthpix_upload::{
    ProgressReporter, TransportResponse, UploadClient, UploadEnvelope, UploadTransport,
};

/// Auth fake accepting exactly `alice`/`pw`.
pub struct FakeAuthTransport;

impl AuthTransport for FakeAuthTransport {
    fn register(
        &self,
        _endpoint: &str,
        _request: &AuthRequest,
    ) -> Result<RegisterResponse, SessionError> {
        Ok(RegisterResponse {
            message: "user created".to_string(),
        })
    }

    fn login(&self, _endpoint: &str, request: &AuthRequest) -> Result<LoginResponse, SessionError> {
        if request.username == "alice" && request.password == "pw" {
            Ok(LoginResponse {
                token: "token-alice".to_string(),
                username: "alice".to_string(),
            })
        } else {
            Err(SessionError::AuthRejected("wrong credentials".to_string()))
        }
    }
}

/// Upload fake returning a canned success after three progress steps.
pub struct FakeUploadTransport {
    pub calls: AtomicUsize,
    pub result: String,
}

impl FakeUploadTransport {
    pub fn new(result: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            result: result.to_string(),
        }
    }
}

impl UploadTransport for FakeUploadTransport {
    fn send(
        &self,
        _envelope: &UploadEnvelope,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<TransportResponse, healthpix_upload::UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for step in [20, 55, 80] {
            progress.report(step);
        }
        Ok(TransportResponse {
            status: 200,
            body: serde_json::json!({
                "status": "success",
                "result": self.result,
                "timestamp": "2026-08-29T10:00:00Z",
            })
            .to_string(),
        })
    }
}

/// History fake serving a configurable body.
pub struct FakeHistoryTransport {
    pub body: std::sync::Mutex<String>,
}

impl FakeHistoryTransport {
    pub fn empty() -> Self {
        Self {
            body: std::sync::Mutex::new("[]".to_string()),
        }
    }

    #[allow(dead_code)]
    pub fn set_body(&self, body: &str) {
        *self.body.lock().expect("body lock should work") = body.to_string();
    }
}

impl HistoryTransport for FakeHistoryTransport {
    fn fetch(&self, _endpoint: &str, _bearer_token: &str) -> Result<String, HistoryError> {
        Ok(self.body.lock().expect("body lock should work").clone())
    }
}

/// Status fake answering with a running service.
pub struct FakeStatusTransport;

impl StatusTransport for FakeStatusTransport {
    fn fetch(&self, _endpoint: &str) -> Result<String, AppError> {
        Ok(r#"{"ai_status":"running","version":"1.0.0","uptime":42}"#.to_string())
    }
}

/// Everything a test needs to drive and inspect the pipeline.
///
/// Not every test binary touches every handle.
#[allow(dead_code)]
pub struct TestRig {
    pub controller: AppController,
    pub camera: Arc<SyntheticCameraBackend>,
    pub upload_transport: Arc<FakeUploadTransport>,
    pub history_transport: Arc<FakeHistoryTransport>,
}

/// Builds a controller over fakes; the camera grants by default.
pub fn rig() -> TestRig {
    rig_with_result("Visual inspection normal. Stay hydrated.")
}

/// Builds a controller whose uploads answer with the given result text.
pub fn rig_with_result(result: &str) -> TestRig {
    let camera = Arc::new(SyntheticCameraBackend::new(64, 48));
    let upload_transport = Arc::new(FakeUploadTransport::new(result));
    let history_transport = Arc::new(FakeHistoryTransport::empty());

    let gate = SessionGate::new("https://api.healthpix.test/", Arc::new(FakeAuthTransport))
        .expect("gate should build");
    let capture = CaptureController::new(camera.clone());
    let uploader = UploadClient::new(
        "https://api.healthpix.test/api/upload",
        upload_transport.clone(),
    )
    .expect("upload client should build");
    let history_client = HistoryClient::new(
        "https://api.healthpix.test/api/history",
        history_transport.clone(),
    )
    .expect("history client should build");
    let status_client = StatusClient::new(
        "https://api.healthpix.test/api/status",
        Arc::new(FakeStatusTransport),
    );

    TestRig {
        controller: AppController::new(
            gate,
            capture,
            uploader,
            history_client,
            status_client,
            Arc::new(NoopHooks),
        ),
        camera,
        upload_transport,
        history_transport,
    }
}

/// Canned credentials matching [`FakeAuthTransport`].
pub fn alice() -> Credentials {
    Credentials {
        username: "alice".to_string(),
        password: "pw".to_string(),
    }
}

/// A small valid JPEG-typed blob for selection tests.
#[allow(dead_code)]
pub fn jpeg_blob(len: usize) -> ImageBlob {
    ImageBlob::new(vec![0xCD; len], "image/jpeg", "picked.jpg").expect("blob should build")
}
