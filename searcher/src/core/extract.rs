//! Locate and parse the JSON payload embedded in free-form agent output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)\b[^\S\n]*\n?(.*?)```").expect("fenced json regex should be valid")
});

/// Extract a JSON value from raw agent output.
///
/// Strategies, first success wins:
/// 1. the first fenced code block tagged `json`;
/// 2. the span from the first `{` to the last `}`.
///
/// Returns `None` when neither yields parseable JSON.
pub fn extract(raw: &str) -> Option<Value> {
    if let Some(body) = first_fenced_json(raw) {
        match serde_json::from_str(body) {
            Ok(value) => return Some(value),
            Err(err) => debug!(err = %err, "fenced json block did not parse"),
        }
    }

    let span = brace_span(raw)?;
    match serde_json::from_str(span) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(err = %err, span_len = span.len(), "brace span did not parse");
            None
        }
    }
}

fn first_fenced_json(raw: &str) -> Option<&str> {
    FENCED_JSON_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
}

fn brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}
