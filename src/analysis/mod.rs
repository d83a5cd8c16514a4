//! Command-level analyses.
//!
//! Each analysis is a pure function of (engine, parameters) → envelope.
//! Recoverable conditions (unknown symbol, no path, cancellation) are
//! reported inside the envelope; storage and I/O errors propagate to
//! the CLI boundary.

pub mod affected;
pub mod breaking;
pub mod complexity;
pub mod context;
pub mod coupling;
pub mod dead;
pub mod deps;
pub mod file_info;
pub mod health;
pub mod impact;
pub mod map;
pub mod risk;
pub mod search;
pub mod trace;
pub mod understand;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::{json, Value};

use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{Result, RoamError};
use crate::graph::SymbolGraph;

/// JSON shape shared by every symbol reference in payloads.
pub(crate) fn symbol_value(graph: &SymbolGraph, idx: u32) -> Value {
    let node = graph.node(idx);
    json!({
        "name": node.name,
        "qualified_name": node.qualified_name,
        "kind": node.kind.as_str(),
        "file": node.path,
        "line": node.line_start,
    })
}

/// Resolve a user query to one arena index.
///
/// Ambiguity is broken deterministically (arena order) and surfaced in
/// the envelope by the caller via `candidates`. A miss yields the
/// standard "not-found" envelope.
pub(crate) fn resolve_symbol(
    graph: &SymbolGraph,
    query: &str,
    command: &str,
) -> std::result::Result<(u32, usize), Envelope> {
    let matches = graph.resolve(query);
    match matches.first() {
        Some(&idx) => Ok((idx, matches.len())),
        None => Err(Envelope::new(command, "not-found")
            .summary_field("query", json!(query))
            .payload_field("results", json!([]))),
    }
}

/// Glob set for the configured test-path patterns.
pub(crate) fn test_matcher(config: &Config) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &config.test_patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RoamError::Config(format!("bad test pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RoamError::Config(format!("test patterns: {e}")))
}

/// Glob set for entry-point names (`main`, `handler`, lifecycle hooks).
pub(crate) fn entry_point_matcher(config: &Config) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &config.entry_points {
        let glob = Glob::new(pattern)
            .map_err(|e| RoamError::Config(format!("bad entry point '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RoamError::Config(format!("entry points: {e}")))
}

/// Convert a recoverable analysis error into its envelope; rethrow the
/// rest.
pub fn envelope_or_raise(command: &str, error: RoamError) -> Result<Envelope> {
    if error.is_recoverable() {
        let message = match &error {
            RoamError::Cancelled => "cancelled".to_string(),
            RoamError::Timeout(_) => "timeout".to_string(),
            other => other.to_string(),
        };
        Ok(Envelope::failure(command, &message))
    } else {
        Err(error)
    }
}
