//! Change-risk rollups: `pr-risk` over the working set and `preflight`
//! for a specific change site. Both compose impact, affected tests,
//! complexity, and fitness violations into one severity.

use std::collections::BTreeSet;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::fitness;
use crate::graph::algo;

use super::{affected::change_targets, symbol_value, test_matcher};

const HIGH_COMPLEXITY: f64 = 25.0;
const WIDE_IMPACT: usize = 50;

#[derive(Debug, Default)]
struct RiskFactors {
    impacted: usize,
    truncated: bool,
    affected_tests: usize,
    max_complexity: f64,
    fitness_violations: usize,
    in_cycle: bool,
}

impl RiskFactors {
    /// 0-based risk points; more points, more reasons to slow down.
    fn points(&self) -> u32 {
        let mut points = 0;
        if self.impacted > WIDE_IMPACT {
            points += 2;
        } else if self.impacted > 10 {
            points += 1;
        }
        if self.affected_tests == 0 {
            points += 2;
        }
        if self.max_complexity >= HIGH_COMPLEXITY {
            points += 1;
        }
        if self.fitness_violations > 0 {
            points += 2;
        }
        if self.in_cycle {
            points += 1;
        }
        points
    }

    fn severity(&self) -> &'static str {
        match self.points() {
            0 => "low",
            1..=2 => "medium",
            3..=4 => "high",
            _ => "critical",
        }
    }
}

fn assess(
    engine: &Engine,
    targets: &[u32],
    graph: &crate::graph::SymbolGraph,
    cancel: &CancelToken,
) -> Result<RiskFactors> {
    let mut factors = RiskFactors::default();

    let tests = test_matcher(engine.config())?;
    let mut impacted: BTreeSet<u32> = BTreeSet::new();
    let mut affected_tests: BTreeSet<u32> = BTreeSet::new();
    for &start in targets {
        let reach = algo::reverse_reachable(graph, start, cancel)?;
        factors.truncated |= reach.truncated;
        for (idx, _) in reach.visited {
            impacted.insert(idx);
            if tests.is_match(&graph.node(idx).path) {
                affected_tests.insert(idx);
            }
        }
    }
    factors.impacted = impacted.len();
    factors.affected_tests = affected_tests.len();

    // Highest complexity among the changed symbols themselves.
    for &idx in targets {
        let id = graph.node(idx).id;
        let complexity: f64 = engine
            .conn()
            .query_row(
                "SELECT cognitive_complexity FROM symbol_metrics WHERE symbol_id = ?1",
                [id],
                |row| row.get(0),
            )
            .unwrap_or(0.0);
        factors.max_complexity = factors.max_complexity.max(complexity);
    }

    let cycles = algo::find_cycles(graph, cancel)?;
    let target_set: BTreeSet<u32> = targets.iter().copied().collect();
    factors.in_cycle = cycles
        .iter()
        .any(|cycle| cycle.iter().any(|idx| target_set.contains(idx)));

    let rules = fitness::load_rules(engine.root())?;
    if !rules.is_empty() {
        let report = fitness::evaluate(engine, &rules, cancel)?;
        factors.fitness_violations = report.violations.len();
    }

    Ok(factors)
}

/// Risk rollup for the staged or working-tree change set.
pub fn pr_risk(engine: &Engine, staged: bool, cancel: &CancelToken) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let targets = match change_targets(engine, &graph, None, staged, "pr-risk")? {
        Ok(targets) => targets,
        Err(envelope) => return Ok(envelope),
    };
    if targets.is_empty() {
        return Ok(Envelope::new("pr-risk", "low")
            .summary_field("changed_symbols", json!(0))
            .payload_field("factors", json!({})));
    }

    let factors = assess(engine, &targets, &graph, cancel)?;
    let severity = factors.severity();

    Ok(Envelope::new("pr-risk", severity)
        .summary_field("changed_symbols", json!(targets.len()))
        .summary_field("risk_points", json!(factors.points()))
        .payload_field(
            "factors",
            json!({
                "impacted": factors.impacted,
                "affected_tests": factors.affected_tests,
                "max_complexity": factors.max_complexity,
                "fitness_violations": factors.fitness_violations,
                "touches_cycle": factors.in_cycle,
                "truncated": factors.truncated,
            }),
        )
        .payload_field(
            "changed",
            json!(targets
                .iter()
                .take(50)
                .map(|&idx| symbol_value(&graph, idx))
                .collect::<Vec<_>>()),
        ))
}

/// Pre-change assessment for one target symbol (or the staged set when
/// no target is given).
pub fn preflight(
    engine: &Engine,
    target: Option<&str>,
    staged: bool,
    cancel: &CancelToken,
) -> Result<Envelope> {
    let graph = engine.symbol_graph()?;
    let targets = match change_targets(engine, &graph, target, staged, "preflight")? {
        Ok(targets) => targets,
        Err(envelope) => return Ok(envelope),
    };
    if targets.is_empty() {
        return Ok(Envelope::new("preflight", "clear")
            .summary_field("targets", json!(0))
            .payload_field("checks", json!({})));
    }

    let factors = assess(engine, &targets, &graph, cancel)?;
    let severity = factors.severity();
    let verdict = match severity {
        "low" => "clear",
        other => other,
    };

    let recommendations = recommendations(&factors);
    Ok(Envelope::new("preflight", verdict)
        .summary_field("targets", json!(targets.len()))
        .summary_field("risk_points", json!(factors.points()))
        .payload_field(
            "checks",
            json!({
                "impact": {"impacted": factors.impacted, "truncated": factors.truncated},
                "tests": {"affected": factors.affected_tests},
                "complexity": {"max": factors.max_complexity},
                "fitness": {"violations": factors.fitness_violations},
                "cycles": {"touches_cycle": factors.in_cycle},
            }),
        )
        .payload_field("recommendations", json!(recommendations))
        .payload_field(
            "targets",
            json!(targets
                .iter()
                .take(50)
                .map(|&idx| symbol_value(&graph, idx))
                .collect::<Vec<_>>()),
        ))
}

fn recommendations(factors: &RiskFactors) -> Vec<&'static str> {
    let mut out = Vec::new();
    if factors.affected_tests == 0 {
        out.push("no tests cover this change; add coverage before editing");
    }
    if factors.impacted > WIDE_IMPACT {
        out.push("wide blast radius; consider splitting the change");
    }
    if factors.max_complexity >= HIGH_COMPLEXITY {
        out.push("target is already complex; simplify before extending");
    }
    if factors.in_cycle {
        out.push("target participates in a dependency cycle");
    }
    if factors.fitness_violations > 0 {
        out.push("fitness rules are failing; run `roam fitness`");
    }
    out
}
