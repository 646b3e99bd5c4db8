//! Normalized analysis results
//!
//! The backend answers disease and variety analyses in several shapes: a bare
//! result object, or one wrapped under `diagnosis` / `variety` / `result` /
//! `data` with the guest counters beside it. `secondaryFindings` can be a
//! plain string or a `{severity, affectedArea}` object. All of that is
//! resolved here, once, into [`AnalysisResult`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const WRAPPER_KEYS: &[&str] = &["diagnosis", "variety", "result", "data"];
const RESULT_KEYS: &[&str] = &[
    "result",
    "diseaseName",
    "disease",
    "varietyName",
    "variety",
    "diagnosis",
    "name",
];

/// Severity of a secondary finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" | "moderate" => Ok(Severity::Medium),
            "high" | "severe" => Ok(Severity::High),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Extra findings reported next to the main result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SecondaryFindings {
    Structured {
        severity: Severity,
        #[serde(rename = "affectedArea")]
        affected_area: String,
    },
    Text(String),
}

/// Result of a disease diagnosis or variety identification
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub result: Option<String>,
    /// Percentage in `0..=100`
    pub confidence_level: Option<f64>,
    /// Milliseconds
    pub processing_time: Option<u64>,
    pub remaining_attempts: Option<u32>,
    pub requires_signup: Option<bool>,
    pub secondary_findings: Option<SecondaryFindings>,
}

impl AnalysisResult {
    /// Decode any of the backend's response shapes.
    pub fn from_response(value: Value) -> Result<Self> {
        let Value::Object(outer) = value else {
            return Err(Error::Decode(format!(
                "expected an analysis object, got {}",
                json_kind(&value)
            )));
        };

        let inner = WRAPPER_KEYS
            .iter()
            .find_map(|key| outer.get(*key).and_then(Value::as_object))
            .unwrap_or(&outer);

        let lookup = |key: &str| inner.get(key).or_else(|| outer.get(key));

        Ok(Self {
            result: RESULT_KEYS
                .iter()
                .find_map(|key| inner.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            confidence_level: lookup("confidenceLevel")
                .or_else(|| lookup("confidence"))
                .and_then(Value::as_f64)
                .map(normalize_confidence),
            processing_time: lookup("processingTime")
                .and_then(Value::as_f64)
                .filter(|ms| *ms >= 0.0)
                .map(|ms| ms.round() as u64),
            remaining_attempts: outer
                .get("remainingAttempts")
                .or_else(|| inner.get("remainingAttempts"))
                .and_then(Value::as_u64)
                .map(|n| n.min(u32::MAX as u64) as u32),
            requires_signup: outer
                .get("requiresSignup")
                .or_else(|| inner.get("requiresSignup"))
                .and_then(Value::as_bool),
            secondary_findings: lookup("secondaryFindings").and_then(decode_findings),
        })
    }

    /// Lines for display. Structured findings render severity and area separately.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.result {
            Some(result) => lines.push(format!("Result: {}", result)),
            None => lines.push("Result: unavailable".to_string()),
        }
        if let Some(confidence) = self.confidence_level {
            lines.push(format!("Confidence: {:.0}%", confidence));
        }
        if let Some(ms) = self.processing_time {
            lines.push(format!("Processing time: {} ms", ms));
        }
        match &self.secondary_findings {
            Some(SecondaryFindings::Text(text)) => {
                lines.push(format!("Additional Findings: {}", text));
            }
            Some(SecondaryFindings::Structured {
                severity,
                affected_area,
            }) => {
                lines.push(format!("Severity: {}", severity.as_str()));
                lines.push(format!("Affected Area: {}", affected_area));
            }
            None => {}
        }
        lines
    }
}

fn normalize_confidence(raw: f64) -> f64 {
    if !(0.0..=100.0).contains(&raw) {
        tracing::warn!(confidence = raw, "Confidence outside 0-100, clamping");
    }
    raw.clamp(0.0, 100.0)
}

fn decode_findings(value: &Value) -> Option<SecondaryFindings> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(SecondaryFindings::Text(text.clone())),
        Value::Object(map) => decode_structured(map),
        other => {
            tracing::warn!(kind = json_kind(other), "Dropping unexpected secondaryFindings");
            None
        }
    }
}

fn decode_structured(map: &Map<String, Value>) -> Option<SecondaryFindings> {
    let severity = map
        .get("severity")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Severity>().ok());
    let affected_area = map.get("affectedArea").and_then(Value::as_str);

    match (severity, affected_area) {
        (Some(severity), Some(area)) => Some(SecondaryFindings::Structured {
            severity,
            affected_area: area.to_string(),
        }),
        _ => {
            tracing::warn!(?map, "Dropping incomplete structured secondaryFindings");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
