//! Centrality measures: PageRank and betweenness.

use std::collections::VecDeque;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::graph::SymbolGraph;

const DAMPING: f64 = 0.85;
const PAGERANK_EPSILON: f64 = 1e-8;
const PAGERANK_MAX_ITERATIONS: usize = 100;

/// Node count above which betweenness switches to source sampling.
const BETWEENNESS_EXACT_LIMIT: usize = 5000;
const BETWEENNESS_SAMPLE: usize = 500;

/// Iterative power-method PageRank with uniform personalisation.
///
/// Stops when the L1 delta drops below 1e-8 or after 100 iterations.
/// Dangling mass is redistributed uniformly so the result sums to 1.
pub fn pagerank(graph: &SymbolGraph, cancel: &CancelToken) -> Result<Vec<f64>> {
    let n = graph.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let uniform = 1.0 / n as f64;
    let mut ranks = vec![uniform; n];
    let mut next = vec![0.0; n];
    let out_counts: Vec<usize> = (0..n as u32).map(|idx| graph.successors(idx).len()).collect();

    for _ in 0..PAGERANK_MAX_ITERATIONS {
        cancel.check()?;
        let mut dangling = 0.0;
        for (idx, &count) in out_counts.iter().enumerate() {
            if count == 0 {
                dangling += ranks[idx];
            }
        }
        let base = (1.0 - DAMPING) * uniform + DAMPING * dangling * uniform;
        next.iter_mut().for_each(|value| *value = base);
        for idx in 0..n as u32 {
            let count = out_counts[idx as usize];
            if count == 0 {
                continue;
            }
            let share = DAMPING * ranks[idx as usize] / count as f64;
            for &target in graph.successors(idx) {
                next[target as usize] += share;
            }
        }

        let delta: f64 = ranks
            .iter()
            .zip(next.iter())
            .map(|(old, new)| (old - new).abs())
            .sum();
        std::mem::swap(&mut ranks, &mut next);
        if delta < PAGERANK_EPSILON {
            break;
        }
    }
    Ok(ranks)
}

/// Brandes betweenness centrality, normalised to [0, 1].
///
/// For graphs with more than 5000 nodes a sampled variant runs from
/// K = min(N, 500) deterministically chosen sources and the result is
/// flagged approximate.
pub fn betweenness(graph: &SymbolGraph, cancel: &CancelToken) -> Result<(Vec<f64>, bool)> {
    let n = graph.len();
    if n < 3 {
        return Ok((vec![0.0; n], false));
    }

    let approximate = n > BETWEENNESS_EXACT_LIMIT;
    let sources: Vec<u32> = if approximate {
        sample_sources(n, BETWEENNESS_SAMPLE.min(n))
    } else {
        (0..n as u32).collect()
    };

    let mut centrality = vec![0.0f64; n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![i64::MAX; n];
    let mut delta = vec![0.0f64; n];
    let mut predecessors: Vec<Vec<u32>> = vec![Vec::new(); n];

    for &source in &sources {
        cancel.check()?;
        // Single-source shortest paths (unweighted).
        sigma.iter_mut().for_each(|s| *s = 0.0);
        dist.iter_mut().for_each(|d| *d = i64::MAX);
        delta.iter_mut().for_each(|d| *d = 0.0);
        predecessors.iter_mut().for_each(Vec::clear);

        sigma[source as usize] = 1.0;
        dist[source as usize] = 0;
        let mut order: Vec<u32> = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in graph.successors(node) {
                if dist[next as usize] == i64::MAX {
                    dist[next as usize] = dist[node as usize] + 1;
                    queue.push_back(next);
                }
                if dist[next as usize] == dist[node as usize] + 1 {
                    sigma[next as usize] += sigma[node as usize];
                    predecessors[next as usize].push(node);
                }
            }
        }

        // Dependency accumulation in reverse BFS order.
        for &node in order.iter().rev() {
            for &pred in &predecessors[node as usize] {
                let share = sigma[pred as usize] / sigma[node as usize]
                    * (1.0 + delta[node as usize]);
                delta[pred as usize] += share;
            }
            if node != source {
                centrality[node as usize] += delta[node as usize];
            }
        }
    }

    // Normalise to [0, 1]; scale up sampled runs to the full source set.
    let scale = if approximate {
        n as f64 / sources.len() as f64
    } else {
        1.0
    };
    let norm = ((n - 1) * (n - 2)) as f64;
    for value in &mut centrality {
        *value = (*value * scale / norm).clamp(0.0, 1.0);
    }

    Ok((centrality, approximate))
}

/// Deterministic source sample: a fixed-seed LCG over the node range,
/// deduplicated. Deterministic so repeated runs agree.
fn sample_sources(n: usize, k: usize) -> Vec<u32> {
    let mut seen = vec![false; n];
    let mut sources = Vec::with_capacity(k);
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15 ^ (n as u64);
    while sources.len() < k {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let candidate = (state >> 33) as usize % n;
        if !seen[candidate] {
            seen[candidate] = true;
            sources.push(candidate as u32);
        }
    }
    sources.sort_unstable();
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_graph;

    #[test]
    fn test_pagerank_sums_to_one() {
        let graph = test_graph(&[(0, 1), (1, 2), (2, 0), (3, 0)], 4);
        let ranks = pagerank(&graph, &CancelToken::new()).unwrap();
        let total: f64 = ranks.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "sum = {total}");
    }

    #[test]
    fn test_pagerank_sums_to_one_with_dangling_nodes() {
        // 2 has no outgoing edges.
        let graph = test_graph(&[(0, 2), (1, 2)], 3);
        let ranks = pagerank(&graph, &CancelToken::new()).unwrap();
        let total: f64 = ranks.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "sum = {total}");
        assert!(ranks[2] > ranks[0]);
    }

    #[test]
    fn test_pagerank_empty_graph() {
        let graph = test_graph(&[], 0);
        assert!(pagerank(&graph, &CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_betweenness_middle_of_chain_is_highest() {
        // 0 -> 1 -> 2; node 1 lies on the only path.
        let graph = test_graph(&[(0, 1), (1, 2)], 3);
        let (centrality, approximate) = betweenness(&graph, &CancelToken::new()).unwrap();
        assert!(!approximate);
        assert!(centrality[1] > centrality[0]);
        assert!(centrality[1] > centrality[2]);
        assert!(centrality.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_sample_sources_deterministic() {
        let a = sample_sources(10_000, 500);
        let b = sample_sources(10_000, 500);
        assert_eq!(a, b);
        assert_eq!(a.len(), 500);
    }
}
