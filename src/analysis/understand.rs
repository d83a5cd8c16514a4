//! One-shot orientation: health summary, entry points, and the most
//! important files. The first command an agent runs in a new codebase.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

use super::{entry_point_matcher, map, symbol_value};

const MAP_BUDGET: usize = 25;

pub fn run(engine: &Engine, cancel: &CancelToken) -> Result<Envelope> {
    let health = super::health::run(engine, cancel)?;
    let overview = map::run(engine, MAP_BUDGET, cancel)?;

    let graph = engine.symbol_graph()?;
    let entry_points = entry_point_matcher(engine.config())?;
    let entries: Vec<_> = (0..graph.len() as u32)
        .filter(|&idx| {
            let node = graph.node(idx);
            node.exported && entry_points.is_match(&node.name)
        })
        .take(20)
        .map(|idx| symbol_value(&graph, idx))
        .collect();

    let (files, symbols, edges) = engine.store().counts()?;
    let languages = language_breakdown(engine)?;

    let verdict = health.summary.verdict.clone();
    let mut envelope = Envelope::new("understand", &verdict)
        .summary_field("files", json!(files))
        .summary_field("symbols", json!(symbols))
        .summary_field("edges", json!(edges));
    if let Some(score) = health.summary.fields.get("score") {
        envelope = envelope.summary_field("health_score", score.clone());
    }
    if let Some(metrics) = health.payload.get("metrics") {
        envelope = envelope.payload_field("metrics", metrics.clone());
    }
    if let Some(issues) = health.payload.get("issues") {
        envelope = envelope.payload_field("issues", issues.clone());
    }
    if let Some(map_files) = overview.payload.get("files") {
        envelope = envelope.payload_field("key_files", map_files.clone());
    }
    Ok(envelope
        .payload_field("entry_points", json!(entries))
        .payload_field("languages", json!(languages)))
}

fn language_breakdown(engine: &Engine) -> Result<Vec<serde_json::Value>> {
    let mut stmt = engine.conn().prepare(
        "SELECT language, COUNT(*) FROM files GROUP BY language ORDER BY COUNT(*) DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(json!({
            "language": row.get::<_, String>(0)?,
            "files": row.get::<_, i64>(1)?,
        }))
    })?;
    let mut breakdown = Vec::new();
    for row in rows {
        breakdown.push(row?);
    }
    Ok(breakdown)
}
