//! Blast radius: reverse reachability from a change site.

use serde_json::{json, Map, Value};

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::graph::algo;

use super::{resolve_symbol, symbol_value};

pub fn run(engine: &Engine, symbol: &str, cancel: &CancelToken) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let (start, candidates) = match resolve_symbol(&graph, symbol, "impact") {
        Ok(resolved) => resolved,
        Err(envelope) => return Ok(envelope),
    };

    let reach = algo::reverse_reachable(&graph, start, cancel)?;
    let impacted = reach.visited.len();

    // Group by hop distance <= 3 plus "farther".
    let mut groups: Map<String, Value> = Map::new();
    for hop in 0u32..=3 {
        let members: Vec<Value> = reach
            .visited
            .iter()
            .filter(|&&(_, d)| d == hop)
            .map(|&(idx, _)| symbol_value(&graph, idx))
            .collect();
        if !members.is_empty() {
            groups.insert(format!("hop_{hop}"), json!(members));
        }
    }
    let farther: Vec<Value> = reach
        .visited
        .iter()
        .filter(|&&(_, d)| d > 3)
        .map(|&(idx, _)| symbol_value(&graph, idx))
        .collect();
    if !farther.is_empty() {
        groups.insert("farther".to_string(), json!(farther));
    }

    let verdict = match impacted {
        1 => "isolated",
        2..=10 => "low-impact",
        11..=50 => "moderate-impact",
        _ => "wide-impact",
    };

    let mut envelope = Envelope::new("impact", verdict)
        .summary_field("impacted", json!(impacted))
        .summary_field("truncated", json!(reach.truncated))
        .payload_field("target", symbol_value(&graph, start))
        .payload_field("by_hop", Value::Object(groups));
    if candidates > 1 {
        envelope = envelope.summary_field("ambiguous_candidates", json!(candidates));
    }
    Ok(envelope)
}
