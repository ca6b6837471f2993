//! Impact assessment oracle abstraction.
//!
//! The oracle is an external reasoning service: given a change summary and
//! the dependent repository's context it returns a confidence, an urgency,
//! a rationale and files worth looking at. Its answers are opaque and
//! non-deterministic, so everything around the call (timeouts, retries,
//! normalization and fallback) lives in
//! [`ImpactAssessor`](crate::services::ImpactAssessor).

mod http;

pub use http::HttpOracle;

use crate::models::CategoryTag;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Repository that changed.
    pub provider_repo: String,
    /// Repository that may be affected.
    pub target_repo: String,
    /// `consumer` or `template`.
    pub relationship_kind: String,
    /// Tags that caused this assessment.
    pub matched_tags: Vec<CategoryTag>,
    /// What changed.
    pub change_summary: String,
    /// What the target repository is and how it relates to the provider.
    pub target_repo_context: String,
}

/// Raw oracle answer, before normalization.
///
/// Values may be out of range: confidence is clamped and unknown urgency
/// strings become `medium` later on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OracleResponse {
    /// Confidence, nominally in `[0, 100]`.
    pub confidence: f64,
    /// Urgency label, nominally one of `critical|high|medium|low`.
    pub urgency: String,
    /// Free text rationale.
    pub rationale: String,
    /// Files in the target repository worth looking at.
    pub recommended_files: Vec<String>,
}

impl OracleResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(confidence: f64, urgency: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            confidence,
            urgency: urgency.into(),
            rationale: rationale.into(),
            recommended_files: Vec::new(),
        }
    }

    /// Sets the recommended files.
    #[must_use]
    pub fn with_files(mut self, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.recommended_files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Parses an oracle answer from text.
    ///
    /// Accepts bare JSON, JSON wrapped in markdown code fences, and JSON
    /// surrounded by prose. `confidence` may be a number or a numeric
    /// string; a 0-1 fraction is not rescaled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedOracleResponse`] when no JSON object can be
    /// found or `confidence` is missing or not numeric.
    pub fn parse(text: &str) -> Result<Self> {
        let json = extract_json_from_response(text);
        let value: Value = serde_json::from_str(json).map_err(|e| {
            Error::MalformedOracleResponse(format!("invalid JSON: {e}. Response: {}", truncate(text)))
        })?;
        let object = value.as_object().ok_or_else(|| {
            Error::MalformedOracleResponse(format!("expected a JSON object, got: {}", truncate(text)))
        })?;

        let confidence = match object.get("confidence") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().map_err(|_| {
                Error::MalformedOracleResponse(format!("confidence is not numeric: '{s}'"))
            })?,
            Some(other) => {
                return Err(Error::MalformedOracleResponse(format!(
                    "confidence is not numeric: {other}"
                )));
            },
            None => {
                return Err(Error::MalformedOracleResponse(
                    "response has no confidence".to_string(),
                ));
            },
        };

        let urgency = object
            .get("urgency")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let rationale = object
            .get("rationale")
            .or_else(|| object.get("reasoning"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let recommended_files = object
            .get("recommended_files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            confidence,
            urgency,
            rationale,
            recommended_files,
        })
    }
}

/// Source of impact assessments.
///
/// Implementations are blocking; callers run them on a blocking thread under
/// a timeout.
pub trait ImpactOracle: Send + Sync {
    /// Oracle name for logs.
    fn name(&self) -> &'static str;

    /// Assesses one change against one dependent repository.
    ///
    /// # Errors
    ///
    /// - [`Error::TransientOracle`] for transport failures (retried)
    /// - [`Error::MalformedOracleResponse`] for unparseable answers (retried)
    /// - [`Error::OracleUnavailable`] when the oracle cannot be used at all
    fn assess(&self, request: &OracleRequest) -> Result<OracleResponse>;
}

/// Oracle used when no endpoint is configured. Every assessment degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOracle;

impl ImpactOracle for DisabledOracle {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn assess(&self, _request: &OracleRequest) -> Result<OracleResponse> {
        Err(Error::OracleUnavailable(
            "no oracle endpoint configured".to_string(),
        ))
    }
}

/// Extracts JSON from an oracle answer, handling markdown code blocks.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let json_start = trimmed[content_start..]
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return &trimmed[start..=end];
    }

    trimmed
}

fn truncate(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
