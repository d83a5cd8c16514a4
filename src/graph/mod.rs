//! In-memory graph views over the index.
//!
//! Nodes are indices into an arena vector; edges are (index, index,
//! kind) triples. Cyclic graphs therefore need no shared ownership,
//! and every algorithm works on plain `u32` indices. Construction is
//! deterministic up to adjacency-list ordering: nodes are loaded in
//! (path, line, qualified name) order.

pub mod algo;
pub mod builder;
pub mod centrality;
pub mod metrics;

use ahash::AHashMap;

use crate::extract::{EdgeKind, SymbolKind};

/// Node payload of the symbol graph.
#[derive(Debug, Clone)]
pub struct SymbolNode {
    /// Database symbol id (not stable across refreshes).
    pub id: i64,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_id: i64,
    pub path: String,
    pub line_start: u32,
    pub exported: bool,
}

/// Directed edge between two arena indices.
#[derive(Debug, Clone, Copy)]
pub struct GraphEdge {
    pub source: u32,
    pub target: u32,
    pub kind: EdgeKind,
    pub line: Option<u32>,
}

/// Immutable adjacency representation of the symbol graph.
pub struct SymbolGraph {
    pub nodes: Vec<SymbolNode>,
    pub edges: Vec<GraphEdge>,
    adjacency: Vec<Vec<u32>>,
    reverse: Vec<Vec<u32>>,
    by_id: AHashMap<i64, u32>,
}

impl SymbolGraph {
    pub fn from_parts(nodes: Vec<SymbolNode>, edges: Vec<GraphEdge>) -> SymbolGraph {
        let n = nodes.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut reverse = vec![Vec::new(); n];
        for edge in &edges {
            adjacency[edge.source as usize].push(edge.target);
            reverse[edge.target as usize].push(edge.source);
        }
        let by_id = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id, idx as u32))
            .collect();
        SymbolGraph {
            nodes,
            edges,
            adjacency,
            reverse,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: u32) -> &SymbolNode {
        &self.nodes[idx as usize]
    }

    pub fn successors(&self, idx: u32) -> &[u32] {
        &self.adjacency[idx as usize]
    }

    pub fn predecessors(&self, idx: u32) -> &[u32] {
        &self.reverse[idx as usize]
    }

    pub fn index_of(&self, symbol_id: i64) -> Option<u32> {
        self.by_id.get(&symbol_id).copied()
    }

    /// Edge-multiplicity degrees: (in, out) per node.
    pub fn degrees(&self) -> Vec<(u32, u32)> {
        let mut degrees = vec![(0u32, 0u32); self.nodes.len()];
        for edge in &self.edges {
            degrees[edge.target as usize].0 += 1;
            degrees[edge.source as usize].1 += 1;
        }
        degrees
    }

    /// Resolve a user-supplied symbol query to arena indices.
    ///
    /// Exact qualified-name matches win; otherwise plain-name matches
    /// are returned. Results are in arena (deterministic) order.
    pub fn resolve(&self, query: &str) -> Vec<u32> {
        let exact: Vec<u32> = (0..self.nodes.len() as u32)
            .filter(|&idx| self.nodes[idx as usize].qualified_name == query)
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        (0..self.nodes.len() as u32)
            .filter(|&idx| self.nodes[idx as usize].name == query)
            .collect()
    }
}

/// Node payload of the file graph.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub id: i64,
    pub path: String,
}

/// Projected file edge: (f1, f2) exists iff any symbol of f1 has an
/// edge to any symbol of f2. Multiplicity counts those symbol edges;
/// `import_count` counts only the `import`-kind ones.
#[derive(Debug, Clone, Copy)]
pub struct FileEdge {
    pub source: u32,
    pub target: u32,
    pub multiplicity: u32,
    pub import_count: u32,
}

/// Immutable file-import projection of the symbol graph.
pub struct FileGraph {
    pub nodes: Vec<FileNode>,
    pub edges: Vec<FileEdge>,
    adjacency: Vec<Vec<u32>>,
    by_id: AHashMap<i64, u32>,
}

impl FileGraph {
    pub fn from_parts(nodes: Vec<FileNode>, edges: Vec<FileEdge>) -> FileGraph {
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for (edge_idx, edge) in edges.iter().enumerate() {
            adjacency[edge.source as usize].push(edge_idx as u32);
        }
        let by_id = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.id, idx as u32))
            .collect();
        FileGraph {
            nodes,
            edges,
            adjacency,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: u32) -> &FileNode {
        &self.nodes[idx as usize]
    }

    pub fn index_of(&self, file_id: i64) -> Option<u32> {
        self.by_id.get(&file_id).copied()
    }

    /// Outgoing projected edges of a file.
    pub fn out_edges(&self, idx: u32) -> impl Iterator<Item = &FileEdge> {
        self.adjacency[idx as usize]
            .iter()
            .map(move |&edge_idx| &self.edges[edge_idx as usize])
    }

    /// Exact path match, falling back to a suffix match at a `/`
    /// boundary (`d.py` must not match `old.py`).
    pub fn find_by_path(&self, path: &str) -> Option<u32> {
        (0..self.nodes.len() as u32)
            .find(|&idx| self.nodes[idx as usize].path == path)
            .or_else(|| {
                let suffix = format!("/{path}");
                (0..self.nodes.len() as u32)
                    .find(|&idx| self.nodes[idx as usize].path.ends_with(&suffix))
            })
    }
}

#[cfg(test)]
pub(crate) fn test_graph(edges: &[(u32, u32)], n: u32) -> SymbolGraph {
    let nodes = (0..n)
        .map(|i| SymbolNode {
            id: i as i64,
            name: format!("s{i}"),
            qualified_name: format!("s{i}"),
            kind: SymbolKind::Function,
            file_id: 0,
            path: "test.py".to_string(),
            line_start: i + 1,
            exported: true,
        })
        .collect();
    let edges = edges
        .iter()
        .map(|&(source, target)| GraphEdge {
            source,
            target,
            kind: EdgeKind::Call,
            line: None,
        })
        .collect();
    SymbolGraph::from_parts(nodes, edges)
}
