#![warn(missing_docs)]
//! # healthpix-analysis-contract
//!
//! ## Purpose
//! Defines the analysis result payload schema and its tolerant parser.
//!
//! ## Responsibilities
//! - Parse structured scoring payloads (overall score, per-metric scores,
//!   recommendations).
//! - Fall back to plain text for payloads that are not structured JSON, so
//!   legacy and placeholder services never break the client.
//! - Validate score ranges for strict consumers.
//!
//! ## Data flow
//! `AnalysisReport.result_payload` -> [`parse_result_payload`] ->
//! [`AnalysisPayload`] -> presenter projection.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs; nothing borrows from the transient
//! response buffer.
//!
//! ## Error model
//! The tolerant entry point is infallible by design; the strict parser
//! returns [`AnalysisContractError`] for schema violations.
//!
//! ## Security and privacy notes
//! This crate handles scoring output only; it never sees tokens or images.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured scoring payload produced by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    /// Overall score in `[0.0, 1.0]`.
    pub overall_score: f64,
    /// Named metric scores, each in `[0.0, 1.0]`.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Optional free-form report section.
    #[serde(default)]
    pub report: ReportSection,
}

/// Free-form report section of a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSection {
    /// Care recommendations, in display order.
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// A result payload after tolerant classification.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    /// Parsed structured scoring document.
    Structured(StructuredAnalysis),
    /// Anything that is not a structured document, carried verbatim.
    Text(String),
}

/// Classifies a raw result payload.
///
/// Plain text, malformed JSON, and JSON lacking the scoring shape all land
/// in [`AnalysisPayload::Text`]; only a well-formed scoring document with a
/// finite overall score parses as structured. This function never fails.
pub fn parse_result_payload(raw: &str) -> AnalysisPayload {
    match parse_structured(raw) {
        Ok(structured) => AnalysisPayload::Structured(structured),
        Err(_) => AnalysisPayload::Text(raw.to_string()),
    }
}

/// Strictly parses a structured scoring document.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for malformed JSON and
/// [`AnalysisContractError::InvalidContract`] for non-finite scores.
pub fn parse_structured(raw: &str) -> Result<StructuredAnalysis, AnalysisContractError> {
    let parsed: StructuredAnalysis =
        serde_json::from_str(raw).map_err(AnalysisContractError::Decode)?;

    if !parsed.overall_score.is_finite() {
        return Err(AnalysisContractError::InvalidContract(
            "overall_score is not a finite number".to_string(),
        ));
    }
    for (name, score) in &parsed.metrics {
        if !score.is_finite() {
            return Err(AnalysisContractError::InvalidContract(format!(
                "metric '{name}' score is not a finite number"
            )));
        }
    }

    Ok(parsed)
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Parsed payload violates contract invariants.
    #[error("analysis contract violation: {0}")]
    InvalidContract(String),
}
