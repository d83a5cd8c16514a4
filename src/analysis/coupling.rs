//! File coupling: unusually strong pairs and hidden coupling.
//!
//! The strength threshold adapts to the project: median plus two
//! median absolute deviations of the pair multiplicities. Hidden
//! coupling is a pair connected by symbol edges with no import edge in
//! either direction.

use ahash::AHashMap;
use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

pub fn run(engine: &Engine, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let files = engine.file_graph()?;

    // Fold directed edges into unordered pairs.
    let mut pairs: AHashMap<(u32, u32), (u32, u32)> = AHashMap::new();
    for edge in &files.edges {
        let key = if edge.source <= edge.target {
            (edge.source, edge.target)
        } else {
            (edge.target, edge.source)
        };
        let entry = pairs.entry(key).or_insert((0, 0));
        entry.0 += edge.multiplicity;
        entry.1 += edge.import_count;
    }

    if pairs.is_empty() {
        return Ok(Envelope::new("coupling", "loose")
            .summary_field("pairs", json!(0))
            .payload_field("coupled", json!([]))
            .payload_field("hidden", json!([])));
    }

    let mut strengths: Vec<u32> = pairs.values().map(|&(m, _)| m).collect();
    strengths.sort_unstable();
    let threshold = adaptive_threshold(&strengths);

    let mut coupled = Vec::new();
    let mut hidden = Vec::new();
    let mut entries: Vec<(&(u32, u32), &(u32, u32))> = pairs.iter().collect();
    entries.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(b.0)));
    for (&(a, b), &(multiplicity, imports)) in entries {
        let pair = json!({
            "a": files.node(a).path,
            "b": files.node(b).path,
            "symbol_edges": multiplicity,
            "import_edges": imports,
        });
        if multiplicity as f64 > threshold {
            coupled.push(pair.clone());
        }
        if imports == 0 {
            hidden.push(pair);
        }
    }

    let verdict = if coupled.is_empty() && hidden.is_empty() {
        "loose"
    } else {
        "coupled"
    };
    Ok(Envelope::new("coupling", verdict)
        .summary_field("pairs", json!(pairs.len()))
        .summary_field("threshold", json!(threshold))
        .summary_field("strong_pairs", json!(coupled.len()))
        .summary_field("hidden_pairs", json!(hidden.len()))
        .payload_field("coupled", json!(coupled))
        .payload_field("hidden", json!(hidden)))
}

/// median + 2 * MAD over sorted strengths.
fn adaptive_threshold(sorted: &[u32]) -> f64 {
    let median = percentile(sorted);
    let mut deviations: Vec<u32> = sorted
        .iter()
        .map(|&v| (v as i64 - median as i64).unsigned_abs() as u32)
        .collect();
    deviations.sort_unstable();
    let mad = percentile(&deviations);
    median as f64 + 2.0 * mad as f64
}

fn percentile(sorted: &[u32]) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_threshold() {
        // median 2, deviations [1, 0, 0, 1, 8] -> sorted [0,0,1,1,8], MAD 1.
        let strengths = [1, 2, 2, 3, 10];
        assert_eq!(adaptive_threshold(&strengths), 4.0);
    }

    #[test]
    fn test_threshold_of_uniform_data() {
        let strengths = [2, 2, 2, 2];
        assert_eq!(adaptive_threshold(&strengths), 2.0);
    }
}
