//! Best-effort detection of the model an agent actually used.

use std::sync::LazyLock;

use regex::Regex;

static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)\bmodel["']?\s*[:=]\s*["'`]?([A-Za-z0-9][A-Za-z0-9._:/\-]*)"#)
        .expect("model regex should be valid")
});

/// Scan raw agent output for a `model: <name>` style marker.
///
/// Returns the first match. Absence is not an error.
pub fn detect_model(raw: &str) -> Option<String> {
    MODEL_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().trim_end_matches(['.', ':']).to_string())
        .filter(|name| !name.is_empty())
}
