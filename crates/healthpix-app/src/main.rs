#![warn(missing_docs)]
//! # healthpix-app binary
//!
//! Headless entry point for smoke checks and embedding diagnostics.

/// CLI entry point.
fn main() {
    env_logger::init();

    println!("healthpix-app {}", healthpix_app::app_version());
    println!(
        "uploads_enabled={} (HEALTHPIX_UPLOAD_ENABLED)",
        healthpix_app::upload_enabled_from_env()
    );
}
