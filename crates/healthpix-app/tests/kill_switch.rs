//! Integration test for runtime kill-switch behavior.
//!
//! Lives alone in this binary: it mutates process environment, so no other
//! test may run concurrently with it.

mod common;

use std::sync::atomic::Ordering;

use healthpix_app::AppError;
use healthpix_core::{UploadJob, UploadStatus};

use common::{alice, rig};

#[test]
fn disabled_switch_refuses_uploads_before_transport() {
    let mut rig = rig();
    rig.controller.login(&alice()).expect("login should succeed");
    rig.controller.start_camera().expect("camera should start");
    rig.controller.capture_photo(1).expect("capture should work");

    // Safety:
    // - This is the only test in this binary, so no other thread reads or
    //   writes process env concurrently.
    // - The variable is removed again before returning.
    unsafe { std::env::set_var("HEALTHPIX_UPLOAD_ENABLED", "0") };

    let mut job = UploadJob::new();
    let error = rig
        .controller
        .upload_pending(&mut job)
        .expect_err("upload must be refused while disabled");
    assert!(matches!(error, AppError::UploadsDisabled));
    assert_eq!(rig.upload_transport.calls.load(Ordering::SeqCst), 0);
    assert_eq!(job.status(), UploadStatus::Pending);

    // Safety: see rationale above.
    unsafe { std::env::remove_var("HEALTHPIX_UPLOAD_ENABLED") };

    // Re-enabled, the same pending image uploads normally.
    rig.controller
        .upload_pending(&mut job)
        .expect("upload should succeed once re-enabled");
    assert_eq!(rig.upload_transport.calls.load(Ordering::SeqCst), 1);
    assert_eq!(job.status(), UploadStatus::Succeeded);
}
