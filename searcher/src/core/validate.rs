//! Minimal shape check for agent payloads.
//!
//! Only the core contract is enforced: a boolean `success`, and a string
//! `report` whenever `success` is true. Every other field is passthrough.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde_json::Value;

const PAYLOAD_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "type": "object",
  "required": ["success"],
  "properties": {
    "success": { "type": "boolean" }
  },
  "if": {
    "properties": { "success": { "const": true } }
  },
  "then": {
    "required": ["report"],
    "properties": { "report": { "type": "string" } }
  }
}"#;

static PAYLOAD_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PAYLOAD_SCHEMA).expect("payload schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("payload schema should compile")
});

/// Return true when `candidate` satisfies the payload contract.
pub fn validate(candidate: &Value) -> bool {
    PAYLOAD_VALIDATOR.is_valid(candidate)
}

/// Human-readable reasons `candidate` fails the payload contract.
pub fn violations(candidate: &Value) -> Vec<String> {
    PAYLOAD_VALIDATOR
        .iter_errors(candidate)
        .map(|err| err.to_string())
        .collect()
}
