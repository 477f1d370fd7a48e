#![warn(missing_docs)]
//! # healthpix-contract-tests
//!
//! Test-only crate: validates contract fixtures against the frozen JSON
//! schemas under `contracts/`. All content lives in `tests/`.
