//! Codebase map: the most important symbols per file, ranked by
//! pagerank, within a symbol budget.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

pub const DEFAULT_BUDGET: usize = 50;

pub fn run(engine: &Engine, budget: usize, cancel: &CancelToken) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    if graph.is_empty() {
        return Ok(Envelope::new("map", "empty")
            .summary_field("symbols", json!(0))
            .payload_field("files", json!([])));
    }

    let ranks = engine.pagerank_vector(&graph, cancel)?;
    let mut order: Vec<u32> = (0..graph.len() as u32).collect();
    order.sort_by(|&a, &b| {
        ranks[b as usize]
            .partial_cmp(&ranks[a as usize])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| graph.node(a).qualified_name.cmp(&graph.node(b).qualified_name))
    });
    order.truncate(budget);

    // Group the budgeted symbols by file, keeping rank order inside
    // each file and ordering files by their best symbol.
    let mut files: Vec<(String, Vec<serde_json::Value>)> = Vec::new();
    for &idx in &order {
        let node = graph.node(idx);
        let entry = json!({
            "name": node.name,
            "qualified_name": node.qualified_name,
            "kind": node.kind.as_str(),
            "line": node.line_start,
            "rank": ranks[idx as usize],
        });
        match files.iter_mut().find(|(path, _)| *path == node.path) {
            Some((_, symbols)) => symbols.push(entry),
            None => files.push((node.path.clone(), vec![entry])),
        }
    }

    let payload: Vec<_> = files
        .into_iter()
        .map(|(path, symbols)| json!({"path": path, "symbols": symbols}))
        .collect();

    Ok(Envelope::new("map", "mapped")
        .summary_field("symbols", json!(order.len()))
        .summary_field("budget", json!(budget))
        .summary_field("total_symbols", json!(graph.len()))
        .payload_field("files", json!(payload)))
}
