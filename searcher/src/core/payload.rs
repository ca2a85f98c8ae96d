//! Typed view of a validated agent payload.
//!
//! The required fields are explicit; everything else the agent sends is kept
//! in a loosely-typed side map and read best-effort.

use serde_json::{Map, Value};
use tracing::debug;

use super::extract::extract;
use super::validate::{validate, violations};
use crate::error::OutputDefect;

/// Optional payload fields, passed through untouched.
pub type PayloadFields = Map<String, Value>;

/// Structured result produced by an agent run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentPayload {
    /// `success: true` with the report text.
    Success { report: String, fields: PayloadFields },
    /// `success: false`, with the agent's own error text when it gave one.
    Failure {
        error: Option<String>,
        fields: PayloadFields,
    },
}

impl AgentPayload {
    /// Convert an extracted value, returning `None` when it does not have the
    /// shape [`validate`] accepts.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let success = fields.remove("success")?.as_bool()?;
        if success {
            let Value::String(report) = fields.remove("report")? else {
                return None;
            };
            return Some(Self::Success { report, fields });
        }
        let error = fields.remove("error").map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        });
        Some(Self::Failure { error, fields })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn report(&self) -> Option<&str> {
        match self {
            Self::Success { report, .. } => Some(report),
            Self::Failure { .. } => None,
        }
    }

    pub fn fields(&self) -> &PayloadFields {
        match self {
            Self::Success { fields, .. } | Self::Failure { fields, .. } => fields,
        }
    }

    /// Agent-declared verification flag. Absent or non-boolean reads as false.
    pub fn verified(&self) -> bool {
        self.fields()
            .get("verified")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Source URLs, accepting plain strings or objects with a `url` field.
    pub fn sources(&self) -> Vec<String> {
        string_items(self.fields().get("sources"), |item| {
            item.get("url").and_then(Value::as_str)
        })
    }

    /// Search queries the agent reports having used.
    pub fn queries(&self) -> Vec<String> {
        string_items(self.fields().get("queries"), |item| {
            item.get("query").and_then(Value::as_str)
        })
    }
}

/// Extract and validate the payload embedded in raw agent output.
pub fn parse_payload(raw: &str) -> Result<AgentPayload, OutputDefect> {
    let value = extract(raw).ok_or(OutputDefect::ExtractionFailure)?;
    if !validate(&value) {
        debug!(violations = ?violations(&value), "payload failed validation");
        return Err(OutputDefect::ValidationFailure);
    }
    AgentPayload::from_value(value).ok_or(OutputDefect::ValidationFailure)
}

fn string_items<'a>(
    value: Option<&'a Value>,
    from_object: impl Fn(&'a Value) -> Option<&'a str>,
) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.as_str()),
            Value::Object(_) => from_object(item),
            _ => None,
        })
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_payload_splits_required_and_optional_fields() {
        let payload = AgentPayload::from_value(json!({
            "success": true,
            "report": "# Findings",
            "verified": true,
            "round": 2
        }))
        .expect("payload");

        assert!(payload.is_success());
        assert_eq!(payload.report(), Some("# Findings"));
        assert!(payload.verified());
        assert_eq!(payload.fields().get("round"), Some(&json!(2)));
        assert!(!payload.fields().contains_key("success"));
    }

    #[test]
    fn failure_payload_keeps_error_text() {
        let payload =
            AgentPayload::from_value(json!({"success": false, "error": "blocked"})).expect("payload");
        assert_eq!(
            payload,
            AgentPayload::Failure {
                error: Some("blocked".to_string()),
                fields: Map::new(),
            }
        );
        assert!(!payload.verified());
    }

    #[test]
    fn invalid_shape_is_rejected() {
        assert_eq!(AgentPayload::from_value(json!({"success": true})), None);
        assert_eq!(AgentPayload::from_value(json!("text")), None);
    }

    #[test]
    fn conversion_agrees_with_validator() {
        let cases = [
            json!({"success": true, "report": "r"}),
            json!({"success": true, "report": 3}),
            json!({"success": true}),
            json!({"success": false}),
            json!({"success": false, "report": 3}),
            json!({"success": "true", "report": "r"}),
            json!({"report": "r"}),
            json!([true]),
        ];
        for value in cases {
            assert_eq!(
                AgentPayload::from_value(value.clone()).is_some(),
                validate(&value),
                "{value}"
            );
        }
    }

    #[test]
    fn sources_accept_strings_and_url_objects() {
        let payload = AgentPayload::from_value(json!({
            "success": true,
            "report": "r",
            "sources": [
                "https://a.example",
                {"url": "https://b.example", "title": "B"},
                {"title": "no url"},
                7,
                "  "
            ],
            "queries": ["rust async", {"query": "tokio process"}]
        }))
        .expect("payload");

        assert_eq!(
            payload.sources(),
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(payload.queries(), vec!["rust async", "tokio process"]);
    }

    #[test]
    fn parse_payload_distinguishes_missing_from_invalid() {
        assert_eq!(
            parse_payload("I could not finish."),
            Err(OutputDefect::ExtractionFailure)
        );
        assert_eq!(
            parse_payload("```json\n{\"success\": true}\n```"),
            Err(OutputDefect::ValidationFailure)
        );
        let payload = parse_payload("done: {\"success\": true, \"report\": \"ok\"}").expect("payload");
        assert_eq!(payload.report(), Some("ok"));
    }

    #[test]
    fn malformed_optional_fields_read_as_empty() {
        let payload = AgentPayload::from_value(json!({
            "success": true,
            "report": "r",
            "sources": "https://a.example",
            "verified": "yes"
        }))
        .expect("payload");

        assert!(payload.sources().is_empty());
        assert!(payload.queries().is_empty());
        assert!(!payload.verified());
    }
}
