//! Plan extraction from free-form model output
//!
//! Models are told to answer with JSON only but routinely wrap it in prose.
//! The candidate document is the span from the first `{` to the last `}`;
//! no brace balancing is attempted, so unrelated braces in the surrounding
//! prose defeat it.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Plan, PlanStep};

/// Default cap on how much raw model output an error carries
pub const DEFAULT_MAX_PREVIEW: usize = 500;

/// Why a plan could not be extracted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NoJsonObject { raw_preview: String },

    #[error("model output is not a valid plan: {reason}")]
    InvalidShape { reason: String, raw_preview: String },
}

impl ExtractError {
    /// Truncated prefix of the raw output, for showing to the user
    pub fn raw_preview(&self) -> &str {
        match self {
            ExtractError::NoJsonObject { raw_preview } => raw_preview,
            ExtractError::InvalidShape { raw_preview, .. } => raw_preview,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    title: String,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    id: Option<RawId>,
    text: String,
}

/// Models emit ids as strings or bare numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Pure text-to-plan extractor with a configurable preview cap
#[derive(Debug, Clone, Copy)]
pub struct PlanExtractor {
    max_preview: usize,
}

impl Default for PlanExtractor {
    fn default() -> Self {
        Self {
            max_preview: DEFAULT_MAX_PREVIEW,
        }
    }
}

impl PlanExtractor {
    pub fn new(max_preview: usize) -> Self {
        Self { max_preview }
    }

    /// Pull a normalized plan out of `raw`
    pub fn extract(&self, raw: &str) -> Result<Plan, ExtractError> {
        debug!(raw_len = raw.len(), "extract: called");

        let span = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                debug!("extract: no brace-delimited span");
                return Err(ExtractError::NoJsonObject {
                    raw_preview: preview(raw, self.max_preview),
                });
            }
        };

        let parsed: RawPlan = serde_json::from_str(span).map_err(|e| {
            debug!(error = %e, "extract: span did not parse as a plan");
            ExtractError::InvalidShape {
                reason: e.to_string(),
                raw_preview: preview(raw, self.max_preview),
            }
        })?;

        let steps = parsed
            .steps
            .into_iter()
            .map(|s| PlanStep {
                id: s.id.map(RawId::into_string).unwrap_or_default(),
                text: s.text,
                done: false,
            })
            .collect();

        let plan = Plan::new(parsed.title, steps).normalized();
        debug!(title = %plan.title, step_count = plan.steps.len(), "extract: plan extracted");
        Ok(plan)
    }
}

/// Extract with the default preview cap
pub fn extract_plan(raw: &str) -> Result<Plan, ExtractError> {
    PlanExtractor::default().extract(raw)
}

/// First `max_chars` characters of `raw`, marked when cut
pub fn preview(raw: &str, max_chars: usize) -> String {
    match raw.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}
