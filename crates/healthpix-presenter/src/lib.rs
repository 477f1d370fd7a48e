#![warn(missing_docs)]
//! # healthpix-presenter
//!
//! ## Purpose
//! Derives the display-ready report model from a raw analysis payload.
//!
//! ## Responsibilities
//! - Bucket the overall score into qualitative levels.
//! - Attach a severity bucket to every named metric score.
//! - Order metrics for stable display.
//! - Degrade gracefully to a truncated text summary for non-structured
//!   payloads.
//!
//! ## Data flow
//! Raw `result_payload` -> `healthpix-analysis-contract` parse ->
//! [`present`] -> display model consumed by the shell.
//!
//! ## Ownership and lifetimes
//! Pure transformation over owned values; no I/O, no shared state.
//!
//! ## Error model
//! This crate favors explicit fallback over recoverable errors: every
//! payload produces a display model.

use healthpix_analysis_contract::{AnalysisPayload, parse_result_payload};

/// Characters kept in the plain-text fallback summary.
pub const TEXT_SUMMARY_MAX_CHARS: usize = 200;

/// Qualitative bucket for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBucket {
    /// Overall score `>= 0.8`.
    Excellent,
    /// Overall score `>= 0.6`.
    Good,
    /// Overall score `>= 0.4`.
    Fair,
    /// Overall score `< 0.4`.
    Attention,
}

/// Severity bucket for one metric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Metric score `< 0.3`.
    Low,
    /// Metric score `< 0.6`.
    Medium,
    /// Metric score `< 0.8`.
    High,
    /// Metric score `>= 0.8`.
    Severe,
}

/// One metric prepared for display.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDisplay {
    /// Metric name as reported by the service.
    pub name: String,
    /// Score clamped to `[0.0, 1.0]`.
    pub score: f64,
    /// Severity bucket for color selection.
    pub severity: Severity,
}

/// Display model for a structured scored report.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDisplay {
    /// Overall score clamped to `[0.0, 1.0]`.
    pub overall_score: f64,
    /// Qualitative bucket of the overall score.
    pub bucket: ScoreBucket,
    /// Metrics sorted by descending score, then name.
    pub metrics: Vec<MetricDisplay>,
    /// Care recommendations in service order.
    pub recommendations: Vec<String>,
}

/// Display model for any report payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayModel {
    /// Structured payload with scores.
    Scored(ScoredDisplay),
    /// Plain-text payload, truncated for display.
    Plain {
        /// Truncated summary of the raw text.
        summary: String,
    },
}

/// Buckets an overall score.
pub fn score_bucket(score: f64) -> ScoreBucket {
    if score >= 0.8 {
        ScoreBucket::Excellent
    } else if score >= 0.6 {
        ScoreBucket::Good
    } else if score >= 0.4 {
        ScoreBucket::Fair
    } else {
        ScoreBucket::Attention
    }
}

/// Buckets one metric score into a severity level.
pub fn metric_severity(score: f64) -> Severity {
    if score < 0.3 {
        Severity::Low
    } else if score < 0.6 {
        Severity::Medium
    } else if score < 0.8 {
        Severity::High
    } else {
        Severity::Severe
    }
}

fn clamp_unit(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Projects a raw result payload into its display model.
///
/// Pure function: structured payloads become [`DisplayModel::Scored`] with
/// bucketed scores; anything else becomes a truncated
/// [`DisplayModel::Plain`] summary. Never fails.
pub fn present(result_payload: &str) -> DisplayModel {
    match parse_result_payload(result_payload) {
        AnalysisPayload::Structured(analysis) => {
            let overall = clamp_unit(analysis.overall_score);
            let mut metrics: Vec<MetricDisplay> = analysis
                .metrics
                .into_iter()
                .map(|(name, score)| {
                    let score = clamp_unit(score);
                    MetricDisplay {
                        name,
                        score,
                        severity: metric_severity(score),
                    }
                })
                .collect();
            // Worst metrics first; name breaks ties so rendering is stable.
            metrics.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            });

            DisplayModel::Scored(ScoredDisplay {
                overall_score: overall,
                bucket: score_bucket(overall),
                metrics,
                recommendations: analysis.report.recommendations,
            })
        }
        AnalysisPayload::Text(text) => {
            let mut chars = text.chars();
            let summary: String = chars.by_ref().take(TEXT_SUMMARY_MAX_CHARS).collect();
            let summary = if chars.next().is_some() {
                format!("{summary}...")
            } else {
                summary
            };
            DisplayModel::Plain { summary }
        }
    }
}
