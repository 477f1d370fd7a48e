//! Logout teardown and orphaned-report tests.

mod common;

use healthpix_capture::CameraState;
use healthpix_core::{AnalysisReport, UploadJob};

use common::{alice, rig};

#[test]
fn logout_cascades_to_history_camera_and_report() {
    let mut rig = rig();
    rig.controller.login(&alice()).expect("login should succeed");
    rig.controller.start_camera().expect("camera should start");
    rig.controller.capture_photo(1).expect("capture should work");

    let mut job = UploadJob::new();
    rig.controller
        .upload_pending(&mut job)
        .expect("upload should succeed");
    assert_eq!(rig.controller.history().len(), 1);
    assert_eq!(rig.camera.live_tracks(), 1);

    rig.controller.logout();

    assert!(!rig.controller.is_authenticated());
    assert!(rig.controller.history().is_empty());
    assert!(rig.controller.last_report().is_none());
    assert_eq!(rig.controller.capture().state(), CameraState::Idle);
    assert_eq!(rig.camera.live_tracks(), 0);

    // Protected calls stay refused afterwards; no stale data comes back.
    assert!(rig.controller.refresh_history().is_err());
    assert!(rig.controller.history().is_empty());
}

#[test]
fn logout_while_logged_out_is_a_quiet_noop() {
    let mut rig = rig();
    rig.controller.logout();
    rig.controller.logout();
    assert!(!rig.controller.is_authenticated());
    assert_eq!(rig.controller.capture().state(), CameraState::Idle);
}

#[test]
fn report_finishing_after_logout_is_discarded() {
    let mut rig = rig();
    rig.controller.login(&alice()).expect("login should succeed");
    let report = AnalysisReport {
        id: "late".to_string(),
        result_payload: "finished after teardown".to_string(),
        timestamp: "2026-08-29T10:00:00Z".to_string(),
        source_image_ref: "f".repeat(64),
    };

    rig.controller.logout();

    assert!(!rig.controller.commit_report(report, "token-alice"));
    assert!(rig.controller.history().is_empty());
    assert!(rig.controller.last_report().is_none());
}

#[test]
fn report_bound_to_a_stale_token_is_discarded() {
    let mut rig = rig();
    rig.controller.login(&alice()).expect("login should succeed");
    let report = AnalysisReport {
        id: "stale".to_string(),
        result_payload: "from a previous session".to_string(),
        timestamp: "2026-08-29T10:00:00Z".to_string(),
        source_image_ref: "a".repeat(64),
    };

    // Uploaded under a token that is no longer the session's token.
    assert!(!rig.controller.commit_report(report.clone(), "token-old"));
    assert!(rig.controller.history().is_empty());

    // The matching token commits normally.
    assert!(rig.controller.commit_report(report, "token-alice"));
    assert_eq!(rig.controller.history().len(), 1);
}
