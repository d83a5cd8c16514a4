//! Materialise graphs from the index.
//!
//! Pure reads: given an open store, build the arena representations.
//! Node order follows (path, line_start, qualified_name) so repeated
//! builds over the same index are identical up to adjacency ordering.

use ahash::AHashMap;
use rusqlite::Connection;

use crate::error::Result;
use crate::extract::{EdgeKind, SymbolKind};
use crate::graph::{FileEdge, FileGraph, FileNode, GraphEdge, SymbolGraph, SymbolNode};

/// Build the symbol graph G_s from the index.
pub fn build_symbol_graph(conn: &Connection) -> Result<SymbolGraph> {
    let mut nodes = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.qualified_name, s.kind, s.file_id, f.path,
                    s.line_start, s.is_exported
             FROM symbols s JOIN files f ON s.file_id = f.id
             ORDER BY f.path, s.line_start, s.qualified_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SymbolNode {
                id: row.get(0)?,
                name: row.get(1)?,
                qualified_name: row.get(2)?,
                kind: SymbolKind::parse(&row.get::<_, String>(3)?),
                file_id: row.get(4)?,
                path: row.get(5)?,
                line_start: row.get::<_, i64>(6)? as u32,
                exported: row.get::<_, i64>(7)? != 0,
            })
        })?;
        for row in rows {
            nodes.push(row?);
        }
    }

    let index_by_id: AHashMap<i64, u32> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id, idx as u32))
        .collect();

    let mut edges = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, kind, line FROM edges ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;
        for row in rows {
            let (source_id, target_id, kind, line) = row?;
            let (Some(&source), Some(&target)) =
                (index_by_id.get(&source_id), index_by_id.get(&target_id))
            else {
                continue;
            };
            edges.push(GraphEdge {
                source,
                target,
                kind: EdgeKind::parse(&kind),
                line: line.map(|l| l as u32),
            });
        }
    }

    Ok(SymbolGraph::from_parts(nodes, edges))
}

/// Build the file graph G_f: the projection of symbol edges onto files.
pub fn build_file_graph(conn: &Connection) -> Result<FileGraph> {
    let mut nodes = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id, path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok(FileNode {
                id: row.get(0)?,
                path: row.get(1)?,
            })
        })?;
        for row in rows {
            nodes.push(row?);
        }
    }
    let index_by_id: AHashMap<i64, u32> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id, idx as u32))
        .collect();

    // Aggregate symbol edges into per-(f1, f2) multiplicities.
    let mut pairs: AHashMap<(u32, u32), (u32, u32)> = AHashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT ss.file_id, ts.file_id, e.kind
             FROM edges e
             JOIN symbols ss ON e.source_id = ss.id
             JOIN symbols ts ON e.target_id = ts.id
             WHERE ss.file_id != ts.file_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (source_file, target_file, kind) = row?;
            let (Some(&source), Some(&target)) = (
                index_by_id.get(&source_file),
                index_by_id.get(&target_file),
            ) else {
                continue;
            };
            let entry = pairs.entry((source, target)).or_insert((0, 0));
            entry.0 += 1;
            if kind == "import" {
                entry.1 += 1;
            }
        }
    }

    let mut edges: Vec<FileEdge> = pairs
        .into_iter()
        .map(|((source, target), (multiplicity, import_count))| FileEdge {
            source,
            target,
            multiplicity,
            import_count,
        })
        .collect();
    edges.sort_by_key(|edge| (edge.source, edge.target));

    Ok(FileGraph::from_parts(nodes, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(crate::store::SCHEMA_SQL).unwrap();
        for (path, id) in [("a.py", 1), ("b.py", 2)] {
            conn.execute(
                "INSERT INTO files (id, path, content_hash, language, line_count, indexed_at)
                 VALUES (?1, ?2, 'h', 'python', 5, 't')",
                params![id, path],
            )
            .unwrap();
        }
        for (id, file_id, name) in [(10, 1, "foo"), (20, 2, "bar")] {
            conn.execute(
                "INSERT INTO symbols (id, file_id, name, qualified_name, kind, line_start,
                                      line_end, is_exported)
                 VALUES (?1, ?2, ?3, ?3, 'function', 1, 3, 1)",
                params![id, file_id, name],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO edges (source_id, target_id, kind, line) VALUES (10, 20, 'call', 2)",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_symbol_graph_from_store() {
        let conn = seeded_conn();
        let graph = build_symbol_graph(&conn).unwrap();
        assert_eq!(graph.len(), 2);
        let foo = graph.index_of(10).unwrap();
        let bar = graph.index_of(20).unwrap();
        assert_eq!(graph.successors(foo), &[bar]);
        assert_eq!(graph.predecessors(bar), &[foo]);
    }

    #[test]
    fn test_file_graph_projection() {
        let conn = seeded_conn();
        let graph = build_file_graph(&conn).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.multiplicity, 1);
        assert_eq!(edge.import_count, 0);
        assert_eq!(graph.node(edge.source).path, "a.py");
        assert_eq!(graph.node(edge.target).path, "b.py");
    }
}
