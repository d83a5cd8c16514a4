//! Per-symbol and aggregate metrics.
//!
//! Cognitive complexity is computed lexically over the symbol's source
//! slice: branch constructs add 1, nesting (derived from indentation)
//! adds 1 per level beyond the first, boolean sequences, recursion, and
//! jumps add 1 each. When the source slice is unavailable the line-based
//! fallback `min(50, max(1, branches + log2(lines + 1)))` applies.

use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::extract::{SymbolKind, SymbolRecord};
use crate::graph::{algo, SymbolGraph};

/// Row destined for the `symbol_metrics` table.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolMetricsRow {
    pub cognitive_complexity: f64,
    pub nesting_depth: u32,
    pub parameter_count: u32,
    pub line_count: u32,
}

/// Compute metrics for one extracted symbol from its file's source.
pub fn symbol_metrics_for(symbol: &SymbolRecord, source: &str) -> SymbolMetricsRow {
    let line_count = symbol.line_end.saturating_sub(symbol.line_start) + 1;
    let parameter_count = parameter_count(&symbol.signature);

    if !matches!(symbol.kind, SymbolKind::Function | SymbolKind::Method) {
        return SymbolMetricsRow {
            cognitive_complexity: 0.0,
            nesting_depth: 0,
            parameter_count,
            line_count,
        };
    }

    let lines: Vec<&str> = source
        .lines()
        .skip(symbol.line_start.saturating_sub(1) as usize)
        .take(line_count as usize)
        .collect();
    if lines.is_empty() {
        return SymbolMetricsRow {
            cognitive_complexity: fallback_complexity(0, line_count),
            nesting_depth: 0,
            parameter_count,
            line_count,
        };
    }

    let scan = cognitive_scan(&lines, &symbol.name);
    SymbolMetricsRow {
        cognitive_complexity: scan.complexity,
        nesting_depth: scan.max_nesting,
        parameter_count,
        line_count,
    }
}

/// Line-based fallback when no source slice is available.
pub fn fallback_complexity(branch_count: u32, line_count: u32) -> f64 {
    let raw = branch_count as f64 + ((line_count as f64) + 1.0).log2();
    raw.max(1.0).min(50.0)
}

/// Keywords that both open a nested block and count as an increment.
const COUNTING_OPENERS: &[&str] = &[
    "if", "elif", "for", "while", "loop", "except", "catch", "case",
];
/// Keywords that open a nested block without counting.
const SILENT_OPENERS: &[&str] = &["else", "try", "finally", "match", "switch", "with", "do"];
const LOOP_KEYWORDS: &[&str] = &["for", "while", "loop"];

struct CognitiveScan {
    complexity: f64,
    max_nesting: u32,
}

fn cognitive_scan(lines: &[&str], own_name: &str) -> CognitiveScan {
    // Stack of (indent, is_loop) for open nesting constructs. The
    // declaration line itself is skipped.
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut complexity = 0u64;
    let mut max_nesting = 0u32;
    let mut saw_recursion = false;

    for line in lines.iter().skip(1) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        let indent = indent_width(line);
        while stack.last().is_some_and(|&(open_indent, _)| open_indent >= indent) {
            stack.pop();
        }

        let tokens = word_tokens(trimmed);
        let nesting = stack.len() as u64;
        let mut opened = false;
        let mut opened_loop = false;

        for (pos, token) in tokens.iter().enumerate() {
            if COUNTING_OPENERS.contains(token) {
                // `else if` counts once: skip the `if` when the
                // preceding token is `else`.
                if *token == "if" && pos > 0 && tokens[pos - 1] == "else" {
                    complexity += 1 + nesting;
                    opened = true;
                    continue;
                }
                // Python inline ternary: `x if cond else y` has `if`
                // mid-line; count it without opening a block.
                if *token == "if" && pos > 0 && tokens.contains(&"else") && !trimmed.ends_with(':')
                {
                    complexity += 1;
                    continue;
                }
                complexity += 1 + nesting;
                opened = true;
                opened_loop = opened_loop || LOOP_KEYWORDS.contains(token);
            } else if SILENT_OPENERS.contains(token) && pos == 0 {
                opened = true;
            } else if *token == "return" || *token == "break" || *token == "continue" {
                let in_loop = stack.iter().any(|&(_, is_loop)| is_loop);
                if *token == "return" {
                    if in_loop {
                        complexity += 1;
                    }
                } else if tokens
                    .get(pos + 1)
                    .is_some_and(|next| !COUNTING_OPENERS.contains(next) && !SILENT_OPENERS.contains(next))
                {
                    // Labelled jump (`break 'outer`, `continue label`).
                    complexity += 1;
                }
            } else if *token == own_name && !saw_recursion {
                let rest = &trimmed[trimmed.find(own_name).unwrap_or(0) + own_name.len()..];
                if rest.trim_start().starts_with('(') {
                    saw_recursion = true;
                    complexity += 1;
                }
            }
        }

        complexity += boolean_sequence_increments(trimmed);

        if opened {
            stack.push((indent, opened_loop));
            max_nesting = max_nesting.max(stack.len() as u32);
        }
    }

    CognitiveScan {
        complexity: complexity as f64,
        max_nesting,
    }
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

fn word_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = line.as_bytes();
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        let is_word = b.is_ascii_alphanumeric() || b == b'_';
        match (start, is_word) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                tokens.push(&line[s..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }
    tokens
}

/// +1 per run of like boolean operators (`a && b && c` is one run,
/// `a && b || c` is two).
fn boolean_sequence_increments(line: &str) -> u64 {
    #[derive(PartialEq, Clone, Copy)]
    enum Op {
        And,
        Or,
    }
    let mut ops: Vec<Op> = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        match &bytes[i..i + 2] {
            b"&&" => {
                ops.push(Op::And);
                i += 2;
            }
            b"||" => {
                ops.push(Op::Or);
                i += 2;
            }
            _ => i += 1,
        }
    }
    for token in word_tokens(line) {
        match token {
            "and" => ops.push(Op::And),
            "or" => ops.push(Op::Or),
            _ => {}
        }
    }

    let mut runs = 0u64;
    let mut previous: Option<Op> = None;
    for op in ops {
        if previous != Some(op) {
            runs += 1;
        }
        previous = Some(op);
    }
    runs
}

fn parameter_count(signature: &str) -> u32 {
    let Some(open) = signature.find('(') else {
        return 0;
    };
    let Some(close) = signature.rfind(')') else {
        return 0;
    };
    if close <= open + 1 {
        return 0;
    }
    signature[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|param| {
            !param.is_empty() && *param != "self" && *param != "&self" && *param != "&mut self"
        })
        .count() as u32
}

// ---------------------------------------------------------------------
// Aggregate metrics and health
// ---------------------------------------------------------------------

/// Degree threshold for god components.
pub const GOD_COMPONENT_DEGREE: u32 = 20;
/// Normalised betweenness threshold for bottlenecks.
pub const BOTTLENECK_BETWEENNESS: f64 = 0.1;

/// Whole-graph metrics feeding the health score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateMetrics {
    pub total_symbols: usize,
    pub symbols_in_cycles: usize,
    pub cycle_count: usize,
    pub tangle_ratio: f64,
    pub propagation_cost: f64,
    pub god_components: usize,
    pub bottlenecks: usize,
    pub dead_exports: usize,
    pub exported_symbols: usize,
}

/// Mean reverse-reachable fraction of the graph per symbol. Sampled
/// deterministically for graphs above 2000 nodes.
pub fn propagation_cost(graph: &SymbolGraph, cancel: &CancelToken) -> Result<f64> {
    let n = graph.len();
    if n == 0 {
        return Ok(0.0);
    }
    let step = (n / 2000).max(1);
    let mut total = 0.0f64;
    let mut sampled = 0usize;
    for idx in (0..n as u32).step_by(step) {
        cancel.check()?;
        let reach = algo::reverse_reachable(graph, idx, cancel)?;
        total += reach.visited.len() as f64 / n as f64;
        sampled += 1;
    }
    Ok(total / sampled.max(1) as f64)
}

/// Health score per the scoring model: start at 100, subtract tangle,
/// god-component, dead-export, and issue penalties, clamp to [0, 100].
pub fn health_score(
    metrics: &AggregateMetrics,
    critical_issues: usize,
    warning_issues: usize,
) -> u32 {
    let mut score = 100.0f64;
    score -= 2.0 * (metrics.tangle_ratio * 100.0);
    score -= (metrics.god_components as f64).min(20.0);
    let dead_pct = if metrics.exported_symbols > 0 {
        metrics.dead_exports as f64 / metrics.exported_symbols as f64 * 100.0
    } else {
        0.0
    };
    score -= (dead_pct / 5.0).floor().min(15.0);
    score -= ((2 * critical_issues + warning_issues) as f64).min(30.0);
    score.clamp(0.0, 100.0).round() as u32
}

/// Verdict band for a health score.
pub fn health_verdict(score: u32) -> &'static str {
    match score {
        85..=100 => "healthy",
        70..=84 => "ok",
        50..=69 => "at-risk",
        _ => "critical",
    }
}
