//! Shortest dependency path between two symbols.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::graph::algo;

use super::{resolve_symbol, symbol_value};

pub fn run(engine: &Engine, source: &str, target: &str, cancel: &CancelToken) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let (from, _) = match resolve_symbol(&graph, source, "trace") {
        Ok(resolved) => resolved,
        Err(envelope) => return Ok(envelope),
    };
    let (to, _) = match resolve_symbol(&graph, target, "trace") {
        Ok(resolved) => resolved,
        Err(envelope) => return Ok(envelope),
    };

    let ranks = engine.pagerank_vector(&graph, cancel)?;
    match algo::shortest_path(&graph, from, to, &ranks, cancel)? {
        Some(path) => {
            let hops: Vec<_> = path.iter().map(|&idx| symbol_value(&graph, idx)).collect();
            Ok(Envelope::new("trace", "path-found")
                .summary_field("length", json!(path.len() - 1))
                .payload_field("path", json!(hops)))
        }
        None => Ok(Envelope::new("trace", "no-path")
            .summary_field("source", json!(source))
            .summary_field("target", json!(target))
            .payload_field("path", json!([]))),
    }
}
