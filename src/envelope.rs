//! Canonical JSON result envelope emitted by every analysis.
//!
//! Every command produces the same outer shape: schema identity, engine
//! version, UTC timestamp, and a `summary` carrying at minimum a
//! `verdict` string. Command-specific payload fields are appended as
//! peer keys so consumers can parse the envelope without knowing the
//! command in advance.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema identifier carried in every envelope.
pub const ENVELOPE_SCHEMA: &str = "roam-envelope-v1";

/// Semantic version of the envelope format.
pub const ENVELOPE_SCHEMA_VERSION: &str = "1.0.0";

/// Summary block. `verdict` is mandatory; analyses append counters and
/// scores as peer keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub verdict: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Summary {
    pub fn new(verdict: impl Into<String>) -> Self {
        Summary {
            verdict: verdict.into(),
            fields: Map::new(),
        }
    }
}

/// Uniform result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub schema: String,
    pub schema_version: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub summary: Summary,
    /// Populated when the analysis short-circuited on an error
    /// (`cancelled`, `timeout`, storage failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Command-specific payload fields, serialised as peer keys.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Start an envelope for `command` with the given verdict.
    pub fn new(command: &str, verdict: &str) -> Self {
        Envelope {
            schema: ENVELOPE_SCHEMA.to_string(),
            schema_version: ENVELOPE_SCHEMA_VERSION.to_string(),
            command: command.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            summary: Summary::new(verdict),
            error: None,
            payload: Map::new(),
        }
    }

    /// Envelope for a failed analysis; `summary.verdict` is "error".
    pub fn failure(command: &str, message: &str) -> Self {
        let mut envelope = Envelope::new(command, "error");
        envelope.error = Some(message.to_string());
        envelope
    }

    /// Append a summary field next to `verdict`.
    pub fn summary_field(mut self, key: &str, value: Value) -> Self {
        self.summary.fields.insert(key.to_string(), value);
        self
    }

    /// Append a command-specific payload field.
    pub fn payload_field(mut self, key: &str, value: Value) -> Self {
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Validate a JSON value against the envelope schema.
///
/// Returns `(is_valid, errors)`. Exposed for tests and for the
/// presentation layers that re-emit envelopes.
pub fn validate_envelope(value: &Value) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return (false, vec!["envelope must be a JSON object".to_string()]),
    };

    for field in ["schema", "schema_version", "command", "version", "timestamp", "summary"] {
        if !obj.contains_key(field) {
            errors.push(format!("missing required field: {field}"));
        }
    }

    match obj.get("summary") {
        Some(Value::Object(summary)) => {
            if !summary.contains_key("verdict") {
                errors.push("'summary' must contain a 'verdict' string".to_string());
            } else if !summary["verdict"].is_string() {
                errors.push("'summary.verdict' must be a string".to_string());
            }
        }
        Some(_) => errors.push("'summary' must be an object".to_string()),
        None => {}
    }

    if let Some(Value::String(version)) = obj.get("schema_version") {
        let parts: Vec<&str> = version.split('.').collect();
        if parts.len() != 3 || !parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())) {
            errors.push("'schema_version' must be a semantic version (X.Y.Z)".to_string());
        }
    }

    (errors.is_empty(), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_envelope_validates() {
        let envelope = Envelope::new("health", "healthy")
            .summary_field("score", json!(92))
            .payload_field("issues", json!([]));
        let value = serde_json::to_value(&envelope).unwrap();
        let (ok, errors) = validate_envelope(&value);
        assert!(ok, "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_failure_envelope_carries_error() {
        let envelope = Envelope::failure("impact", "cancelled");
        assert_eq!(envelope.summary.verdict, "error");
        assert_eq!(envelope.error.as_deref(), Some("cancelled"));
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(validate_envelope(&value).0);
    }

    #[test]
    fn test_validator_rejects_missing_fields() {
        let (ok, errors) = validate_envelope(&json!({"command": "health"}));
        assert!(!ok);
        assert!(errors.iter().any(|e| e.contains("schema_version")));
        assert!(errors.iter().any(|e| e.contains("summary")));
    }

    #[test]
    fn test_validator_rejects_bad_semver() {
        let (ok, errors) = validate_envelope(&json!({
            "schema": ENVELOPE_SCHEMA,
            "schema_version": "1.0",
            "command": "health",
            "version": "1.0.0",
            "timestamp": "2026-01-01T00:00:00Z",
            "summary": {"verdict": "ok"},
        }));
        assert!(!ok);
        assert!(errors.iter().any(|e| e.contains("semantic version")));
    }

    #[test]
    fn test_payload_fields_are_peer_keys() {
        let envelope = Envelope::new("dead", "clean").payload_field("dead", json!([]));
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("dead").is_some());
        assert!(value.get("payload").is_none());
    }
}
