//! Cognitive complexity hotspots.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

pub const DEFAULT_THRESHOLD: f64 = 15.0;

pub fn run(engine: &Engine, threshold: f64, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let mut stmt = engine.conn().prepare(
        "SELECT s.name, s.qualified_name, s.kind, f.path, s.line_start,
                m.cognitive_complexity, m.nesting_depth, m.parameter_count, m.line_count
         FROM symbol_metrics m
         JOIN symbols s ON m.symbol_id = s.id
         JOIN files f ON s.file_id = f.id
         WHERE m.cognitive_complexity >= ?1
         ORDER BY m.cognitive_complexity DESC, f.path, s.line_start",
    )?;
    let rows = stmt.query_map([threshold], |row| {
        Ok(json!({
            "name": row.get::<_, String>(0)?,
            "qualified_name": row.get::<_, String>(1)?,
            "kind": row.get::<_, String>(2)?,
            "file": row.get::<_, String>(3)?,
            "line": row.get::<_, i64>(4)?,
            "complexity": row.get::<_, f64>(5)?,
            "nesting_depth": row.get::<_, i64>(6)?,
            "parameters": row.get::<_, i64>(7)?,
            "lines": row.get::<_, i64>(8)?,
        }))
    })?;
    let mut symbols = Vec::new();
    for row in rows {
        symbols.push(row?);
    }

    let verdict = if symbols.is_empty() { "clean" } else { "complex" };
    Ok(Envelope::new("complexity", verdict)
        .summary_field("threshold", json!(threshold))
        .summary_field("offenders", json!(symbols.len()))
        .payload_field("symbols", json!(symbols))
        .payload_field("approximation", json!("lexical-nesting")))
}
