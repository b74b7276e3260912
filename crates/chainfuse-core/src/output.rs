//! Best-effort structured parsing of raw model responses.
//!
//! Models often wrap JSON in a markdown fence, so a ```` ```json ```` block is
//! preferred over the full response. Parsing never fails: anything that is not
//! valid JSON is kept as the original text.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::StepOutput;

lazy_static! {
    /// A fenced code block tagged `json` (tag is case-insensitive).
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?i:json)\s*(.*?)```").unwrap();
}

/// Text inside the first ```` ```json ```` fence, if any.
pub fn fenced_json(raw: &str) -> Option<&str> {
    FENCED_JSON
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Classify a raw response as structured JSON or plain text.
pub fn parse_output(raw: &str) -> StepOutput {
    let candidate = fenced_json(raw).unwrap_or(raw).trim();

    match serde_json::from_str(candidate) {
        Ok(value) => StepOutput::Structured(value),
        Err(_) => StepOutput::Text(raw.to_string()),
    }
}
