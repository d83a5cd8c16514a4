//! Dead-symbol detection: exported symbols nothing references.

use globset::GlobSet;
use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::extract::SymbolKind;
use crate::graph::SymbolGraph;

use super::{entry_point_matcher, symbol_value, test_matcher};

/// Arena indices of dead exports: exported, in-degree 0, not a module,
/// not an entry point, and not defined in a test file (test symbols are
/// invoked by the runner, not by edges).
pub(crate) fn dead_export_indices(
    graph: &SymbolGraph,
    entry_points: &GlobSet,
    tests: &GlobSet,
) -> Vec<u32> {
    let degrees = graph.degrees();
    (0..graph.len() as u32)
        .filter(|&idx| {
            let node = graph.node(idx);
            node.exported
                && node.kind != SymbolKind::Module
                && degrees[idx as usize].0 == 0
                && !entry_points.is_match(&node.name)
                && !tests.is_match(&node.path)
        })
        .collect()
}

pub fn run(engine: &Engine, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let graph = engine.symbol_graph()?;
    let entry_points = entry_point_matcher(engine.config())?;
    let tests = test_matcher(engine.config())?;

    let dead = dead_export_indices(&graph, &entry_points, &tests);
    let verdict = if dead.is_empty() { "clean" } else { "dead-code" };

    let items: Vec<_> = dead
        .iter()
        .map(|&idx| {
            let mut value = symbol_value(&graph, idx);
            value["reason"] = json!("exported but never referenced");
            value
        })
        .collect();

    Ok(Envelope::new("dead", verdict)
        .summary_field("dead_exports", json!(dead.len()))
        .summary_field("total_symbols", json!(graph.len()))
        .payload_field("dead", json!(items)))
}
