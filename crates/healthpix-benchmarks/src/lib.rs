#![warn(missing_docs)]
//! # healthpix-benchmarks
//!
//! Test-only crate: latency smoke checks for the capture hot path. All
//! content lives in `tests/`.
