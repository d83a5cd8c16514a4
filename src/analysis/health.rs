//! Codebase health: aggregate metrics, issues, and a scored verdict.

use serde_json::{json, Value};

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::graph::metrics::{
    health_score, health_verdict, propagation_cost, AggregateMetrics, BOTTLENECK_BETWEENNESS,
    GOD_COMPONENT_DEGREE,
};
use crate::graph::{algo, SymbolGraph};

use super::{dead, entry_point_matcher, symbol_value, test_matcher};

/// Complexity at which a symbol becomes a health warning.
const COMPLEXITY_WARNING: f64 = 25.0;
/// Issues listed in the payload.
const MAX_ISSUES: usize = 10;

pub fn run(engine: &Engine, cancel: &CancelToken) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let (files, symbols, edges) = engine.store().counts()?;

    if graph.is_empty() {
        return Ok(Envelope::new("health", "healthy")
            .summary_field("score", json!(100))
            .summary_field("files", json!(files))
            .summary_field("symbols", json!(0))
            .payload_field("metrics", json!(AggregateMetrics::default()))
            .payload_field("issues", json!([])));
    }

    let cycles = algo::find_cycles(&graph, cancel)?;
    let (metric_rows, approximate) = engine.graph_metrics(&graph, cancel)?;
    let propagation = propagation_cost(&graph, cancel)?;

    let entry_points = entry_point_matcher(engine.config())?;
    let tests = test_matcher(engine.config())?;
    let dead_exports = dead::dead_export_indices(&graph, &entry_points, &tests);

    let mut god_components = Vec::new();
    let mut bottlenecks = Vec::new();
    for idx in 0..graph.len() as u32 {
        let node = graph.node(idx);
        let Some(row) = metric_rows.get(&node.id) else {
            continue;
        };
        if row.in_degree + row.out_degree > GOD_COMPONENT_DEGREE {
            god_components.push(idx);
        }
        if row.betweenness > BOTTLENECK_BETWEENNESS {
            bottlenecks.push(idx);
        }
    }

    let complexity_offenders = complexity_offenders(engine)?;

    let symbols_in_cycles: usize = cycles.iter().map(Vec::len).sum();
    let exported = (0..graph.len() as u32)
        .filter(|&idx| graph.node(idx).exported)
        .count();
    let metrics = AggregateMetrics {
        total_symbols: graph.len(),
        symbols_in_cycles,
        cycle_count: cycles.len(),
        tangle_ratio: symbols_in_cycles as f64 / graph.len() as f64,
        propagation_cost: propagation,
        god_components: god_components.len(),
        bottlenecks: bottlenecks.len(),
        dead_exports: dead_exports.len(),
        exported_symbols: exported,
    };

    let issues = collect_issues(&graph, &cycles, &god_components, &bottlenecks, &complexity_offenders);
    let critical = issues.iter().filter(|i| i["severity"] == "critical").count();
    let warnings = issues.len() - critical;

    let score = health_score(&metrics, critical, warnings);
    let verdict = health_verdict(score);

    let mut envelope = Envelope::new("health", verdict)
        .summary_field("score", json!(score))
        .summary_field("files", json!(files))
        .summary_field("symbols", json!(symbols))
        .summary_field("edges", json!(edges))
        .payload_field("metrics", json!(metrics))
        .payload_field(
            "issues",
            json!(issues.into_iter().take(MAX_ISSUES).collect::<Vec<_>>()),
        );
    if approximate {
        envelope = envelope.payload_field("approximate", json!(true));
    }
    Ok(envelope)
}

/// Issues ordered most severe first; cycles lead.
fn collect_issues(
    graph: &SymbolGraph,
    cycles: &[Vec<u32>],
    god_components: &[u32],
    bottlenecks: &[u32],
    complexity_offenders: &[(String, String, f64)],
) -> Vec<Value> {
    let mut issues = Vec::new();
    for cycle in cycles {
        let members: Vec<&str> = cycle
            .iter()
            .take(5)
            .map(|&idx| graph.node(idx).qualified_name.as_str())
            .collect();
        issues.push(json!({
            "severity": "critical",
            "kind": "cycle",
            "message": format!("dependency cycle of {} symbols", cycle.len()),
            "members": members,
        }));
    }
    for &idx in god_components {
        issues.push(json!({
            "severity": "warning",
            "kind": "god-component",
            "message": format!("{} has degree above {}", graph.node(idx).qualified_name, GOD_COMPONENT_DEGREE),
            "symbol": symbol_value(graph, idx),
        }));
    }
    for &idx in bottlenecks {
        issues.push(json!({
            "severity": "warning",
            "kind": "bottleneck",
            "message": format!("{} sits on many shortest paths", graph.node(idx).qualified_name),
            "symbol": symbol_value(graph, idx),
        }));
    }
    for (qname, path, value) in complexity_offenders {
        issues.push(json!({
            "severity": "warning",
            "kind": "complexity",
            "message": format!("{qname} has cognitive complexity {value:.0}"),
            "file": path,
        }));
    }
    issues
}

fn complexity_offenders(engine: &Engine) -> Result<Vec<(String, String, f64)>> {
    let mut stmt = engine.conn().prepare(
        "SELECT s.qualified_name, f.path, m.cognitive_complexity
         FROM symbol_metrics m
         JOIN symbols s ON m.symbol_id = s.id
         JOIN files f ON s.file_id = f.id
         WHERE m.cognitive_complexity >= ?1
         ORDER BY m.cognitive_complexity DESC
         LIMIT 20",
    )?;
    let rows = stmt.query_map([COMPLEXITY_WARNING], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    let mut offenders = Vec::new();
    for row in rows {
        offenders.push(row?);
    }
    Ok(offenders)
}
