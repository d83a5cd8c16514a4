//! Working context for one symbol: callers, callees, siblings, tests.

use std::collections::BTreeSet;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::graph::algo;

use super::{resolve_symbol, symbol_value, test_matcher};

const SIBLING_LIMIT: usize = 20;

pub fn run(
    engine: &Engine,
    symbol: &str,
    task: Option<&str>,
    cancel: &CancelToken,
) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let (idx, candidates) = match resolve_symbol(&graph, symbol, "context") {
        Ok(resolved) => resolved,
        Err(envelope) => return Ok(envelope),
    };
    cancel.check()?;

    let node = graph.node(idx);
    let mut callers: Vec<u32> = graph.predecessors(idx).to_vec();
    callers.sort_unstable();
    callers.dedup();
    let mut callees: Vec<u32> = graph.successors(idx).to_vec();
    callees.sort_unstable();
    callees.dedup();

    let siblings: Vec<_> = (0..graph.len() as u32)
        .filter(|&other| other != idx && graph.node(other).file_id == node.file_id)
        .take(SIBLING_LIMIT)
        .map(|other| symbol_value(&graph, other))
        .collect();

    // Test files whose symbols reach this one.
    let tests = test_matcher(engine.config())?;
    let reach = algo::reverse_reachable(&graph, idx, cancel)?;
    let test_files: BTreeSet<&str> = reach
        .visited
        .iter()
        .map(|&(other, _)| graph.node(other).path.as_str())
        .filter(|path| tests.is_match(path))
        .collect();

    let mut envelope = Envelope::new("context", "found")
        .summary_field("callers", json!(callers.len()))
        .summary_field("callees", json!(callees.len()))
        .payload_field("symbol", symbol_value(&graph, idx))
        .payload_field(
            "callers",
            json!(callers.iter().map(|&c| symbol_value(&graph, c)).collect::<Vec<_>>()),
        )
        .payload_field(
            "callees",
            json!(callees.iter().map(|&c| symbol_value(&graph, c)).collect::<Vec<_>>()),
        )
        .payload_field("siblings", json!(siblings))
        .payload_field("test_files", json!(test_files));
    if candidates > 1 {
        envelope = envelope.summary_field("ambiguous_candidates", json!(candidates));
    }

    // Task-specific extras.
    match task {
        Some("debug") => {
            let two_hops: Vec<_> = reach
                .visited
                .iter()
                .filter(|&&(_, d)| d > 0 && d <= 2)
                .map(|&(other, _)| symbol_value(&graph, other))
                .collect();
            envelope = envelope.payload_field("call_chain", json!(two_hops));
        }
        Some("refactor") => {
            envelope = envelope
                .payload_field(
                    "impact_summary",
                    json!({"impacted": reach.visited.len(), "truncated": reach.truncated}),
                );
        }
        Some("test") => {
            envelope = envelope.payload_field(
                "untested",
                json!(test_files.is_empty()),
            );
        }
        _ => {}
    }
    if let Some(task) = task {
        envelope = envelope.summary_field("task", json!(task));
    }

    Ok(envelope)
}
