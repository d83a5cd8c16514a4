//! Tests reachable (in reverse) from a change site.

use std::collections::BTreeSet;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::graph::{algo, SymbolGraph};

use super::{resolve_symbol, symbol_value, test_matcher};

/// Resolve the starting set: an explicit target symbol, or every
/// symbol in the git-changed files.
pub(crate) fn change_targets(
    engine: &Engine,
    graph: &SymbolGraph,
    target: Option<&str>,
    staged: bool,
    command: &str,
) -> Result<std::result::Result<Vec<u32>, Envelope>> {
    if let Some(query) = target {
        return Ok(match resolve_symbol(graph, query, command) {
            Ok((idx, _)) => Ok(vec![idx]),
            Err(envelope) => Err(envelope),
        });
    }

    let git = engine.git()?;
    let changed = git.changed_files(staged)?;
    if changed.is_empty() {
        return Ok(Err(Envelope::new(command, "no-changes")
            .summary_field("changed_files", json!(0))));
    }
    let targets: Vec<u32> = (0..graph.len() as u32)
        .filter(|&idx| changed.iter().any(|path| graph.node(idx).path == *path))
        .collect();
    Ok(Ok(targets))
}

pub fn run(
    engine: &Engine,
    target: Option<&str>,
    staged: bool,
    cancel: &CancelToken,
) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let targets = match change_targets(engine, &graph, target, staged, "affected-tests")? {
        Ok(targets) => targets,
        Err(envelope) => return Ok(envelope),
    };

    let tests = test_matcher(engine.config())?;
    let mut affected: BTreeSet<u32> = BTreeSet::new();
    for &start in &targets {
        let reach = algo::reverse_reachable(&graph, start, cancel)?;
        for (idx, _) in reach.visited {
            if tests.is_match(&graph.node(idx).path) {
                affected.insert(idx);
            }
        }
    }

    let mut test_files: BTreeSet<&str> = BTreeSet::new();
    for &idx in &affected {
        test_files.insert(graph.node(idx).path.as_str());
    }

    let verdict = if affected.is_empty() { "no-tests" } else { "covered" };
    Ok(Envelope::new("affected-tests", verdict)
        .summary_field("targets", json!(targets.len()))
        .summary_field("affected_tests", json!(affected.len()))
        .summary_field("test_files", json!(test_files.len()))
        .payload_field(
            "tests",
            json!(affected
                .iter()
                .map(|&idx| symbol_value(&graph, idx))
                .collect::<Vec<_>>()),
        )
        .payload_field("files", json!(test_files)))
}
