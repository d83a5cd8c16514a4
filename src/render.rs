//! Human text rendering of envelopes.
//!
//! Every command prints a `VERDICT:` line first, then its summary
//! counters, then payload sections. JSON mode bypasses this entirely.

use serde_json::Value;

use roam::Envelope;

/// Rows shown per payload list before truncating.
const LIST_LIMIT: usize = 30;

pub fn render(envelope: &Envelope) -> String {
    let mut out = String::new();
    out.push_str(&format!("VERDICT: {}\n", envelope.summary.verdict));

    if let Some(error) = &envelope.error {
        out.push_str(&format!("error: {error}\n"));
        return out;
    }

    for (key, value) in &envelope.summary.fields {
        out.push_str(&format!("  {key}: {}\n", scalar(value)));
    }

    for (key, value) in &envelope.payload {
        match value {
            Value::Array(items) if !items.is_empty() => {
                out.push('\n');
                out.push_str(&format!("{key} ({}):\n", items.len()));
                for item in items.iter().take(LIST_LIMIT) {
                    out.push_str(&format!("  {}\n", row(item)));
                }
                if items.len() > LIST_LIMIT {
                    out.push_str(&format!("  ... and {} more\n", items.len() - LIST_LIMIT));
                }
            }
            Value::Object(map) if !map.is_empty() => {
                out.push('\n');
                out.push_str(&format!("{key}:\n"));
                for (k, v) in map {
                    out.push_str(&format!("  {k}: {}\n", row(v)));
                }
            }
            Value::Array(_) => {}
            other => {
                out.push_str(&format!("  {key}: {}\n", scalar(other)));
            }
        }
    }
    out
}

/// One-line rendering of a payload entry.
fn row(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            // Symbol-shaped entries get the compact `name  file:line` form.
            if let (Some(name), Some(file)) = (
                map.get("qualified_name").or_else(|| map.get("name")),
                map.get("file").or_else(|| map.get("path")),
            ) {
                let location = match map.get("line").or_else(|| map.get("line_start")) {
                    Some(line) => format!("{}:{}", scalar(file), scalar(line)),
                    None => scalar(file),
                };
                let extra = ["score", "complexity", "rank", "symbol_edges", "severity", "kind"]
                    .iter()
                    .filter_map(|k| map.get(*k).map(|v| format!("{k}={}", scalar(v))))
                    .collect::<Vec<_>>()
                    .join(" ");
                if extra.is_empty() {
                    format!("{}  {}", scalar(name), location)
                } else {
                    format!("{}  {}  {}", scalar(name), location, extra)
                }
            } else if let Some(message) = map.get("message") {
                let severity = map
                    .get("severity")
                    .map(|s| format!("[{}] ", scalar(s)))
                    .unwrap_or_default();
                format!("{severity}{}", scalar(message))
            } else {
                map.iter()
                    .map(|(k, v)| format!("{k}={}", scalar(v)))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract().abs() > f64::EPSILON && f.abs() < 1000.0 {
                    return format!("{f:.3}");
                }
            }
            n.to_string()
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_starts_with_verdict() {
        let envelope = Envelope::new("health", "healthy");
        assert!(render(&envelope).starts_with("VERDICT: healthy"));
    }

    #[test]
    fn test_render_error_envelope() {
        let envelope = Envelope::failure("impact", "cancelled");
        let text = render(&envelope);
        assert!(text.starts_with("VERDICT: error"));
        assert!(text.contains("cancelled"));
    }

    #[test]
    fn test_render_symbol_rows() {
        let envelope = Envelope::new("dead", "dead-code").payload_field(
            "dead",
            json!([{"qualified_name": "unused", "file": "lib.py", "line": 3}]),
        );
        let text = render(&envelope);
        assert!(text.contains("unused  lib.py:3"), "{text}");
    }
}
