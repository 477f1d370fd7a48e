//! Benchmark smoke test for the crop/encode/fingerprint hot path.

use std::time::Instant;

use healthpix_capture::{CAPTURE_JPEG_QUALITY, Frame, crop_centered_square, encode_jpeg};
use healthpix_upload::image_fingerprint;

#[test]
fn benchmark_capture_path_prints_latency() {
    let frame = Frame::new(96, 64, vec![0x7F; 96 * 64 * 4]).expect("frame should be valid");

    let start = Instant::now();
    let mut fingerprint_lengths = 0usize;

    for _ in 0..100 {
        let square = crop_centered_square(&frame);
        let encoded = encode_jpeg(&square, CAPTURE_JPEG_QUALITY).expect("encode should work");
        fingerprint_lengths += image_fingerprint(&encoded).len();
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_capture_elapsed_ms={elapsed_ms}");
    println!("benchmark_fingerprint_total_len={fingerprint_lengths}");

    // This is a lightweight guardrail; strict NFR checks are environment-specific.
    assert!(
        elapsed_ms < 5_000,
        "capture path smoke benchmark should stay bounded"
    );
}
