//! Engine: project root, configuration, extractor table, and the open
//! index. Passed explicitly to every analysis; there are no process
//! globals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::{index_db_path, Config};
use crate::error::{Result, RoamError};
use crate::extract::ExtractorSet;
use crate::gitio::GitProvider;
use crate::graph::{builder, centrality, FileGraph, SymbolGraph};
use crate::indexer::{index_project, IndexSummary, Progress};
use crate::search;
use crate::store::Store;

/// Per-symbol derived graph metrics, keyed by database symbol id.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMetricsRow {
    pub in_degree: u32,
    pub out_degree: u32,
    pub pagerank: f64,
    pub betweenness: f64,
}

pub struct Engine {
    root: PathBuf,
    config: Config,
    extractors: ExtractorSet,
    store: Store,
    /// Serialises lazy metric rebuilds so concurrent callers share one
    /// computation.
    metrics_lock: Mutex<()>,
}

impl Engine {
    /// Open the engine with the built-in extractor table, indexing
    /// first when no usable index exists.
    pub fn open(root: &Path) -> Result<Engine> {
        Engine::with_extractors(root, ExtractorSet::builtin())
    }

    /// Open with a caller-supplied extractor table.
    pub fn with_extractors(root: &Path, extractors: ExtractorSet) -> Result<Engine> {
        let config = Config::load(root)?;
        let db_path = index_db_path(root);
        let store = match Store::open_readonly(&db_path) {
            Ok(store) => store,
            Err(RoamError::IndexMissing(_)) | Err(RoamError::IndexVersionMismatch { .. }) => {
                info!(root = %root.display(), "no usable index; building");
                // A mismatched schema is rebuilt from scratch rather
                // than migrated under the reader's feet.
                for suffix in ["", "-wal", "-shm"] {
                    let _ = std::fs::remove_file(db_path.with_file_name(format!(
                        "{}{suffix}",
                        db_path.file_name().unwrap_or_default().to_string_lossy()
                    )));
                }
                let mut writer = Store::open(&db_path)?;
                index_project(&mut writer, root, &config, &extractors, None)?;
                drop(writer);
                Store::open_readonly(&db_path)?
            }
            Err(e) => return Err(e),
        };
        Ok(Engine {
            root: root.to_path_buf(),
            config,
            extractors,
            store,
            metrics_lock: Mutex::new(()),
        })
    }

    /// Run a full index pass. Used by the `index` command; analyses use
    /// [`Engine::open`] which indexes only when the index is missing.
    pub fn index(
        root: &Path,
        extractors: &ExtractorSet,
        progress: Option<Progress>,
    ) -> Result<IndexSummary> {
        let config = Config::load(root)?;
        let mut writer = Store::open(&index_db_path(root))?;
        index_project(&mut writer, root, &config, extractors, progress)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn extractors(&self) -> &ExtractorSet {
        &self.extractors
    }

    pub fn conn(&self) -> &Connection {
        self.store.conn()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn git(&self) -> Result<GitProvider> {
        GitProvider::open(&self.root)
    }

    pub fn symbol_graph(&self) -> Result<SymbolGraph> {
        builder::build_symbol_graph(self.conn())
    }

    pub fn file_graph(&self) -> Result<FileGraph> {
        builder::build_file_graph(self.conn())
    }

    /// Load graph metrics, lazily recomputing them when any symbol
    /// lacks a row. Returns the rows and whether betweenness was
    /// sampled (`approximate`).
    pub fn graph_metrics(
        &self,
        graph: &SymbolGraph,
        cancel: &CancelToken,
    ) -> Result<(HashMap<i64, GraphMetricsRow>, bool)> {
        let missing: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM symbols s
             LEFT JOIN graph_metrics g ON s.id = g.symbol_id
             WHERE g.symbol_id IS NULL OR g.pagerank IS NULL",
            [],
            |row| row.get(0),
        )?;

        let mut approximate = graph.len() > 5000;
        if missing > 0 {
            let _guard = self
                .metrics_lock
                .lock()
                .map_err(|_| RoamError::Io(std::io::Error::other("metrics lock poisoned")))?;
            approximate = self.rebuild_graph_metrics(graph, cancel)?;
        }

        let mut rows = HashMap::new();
        let mut stmt = self.conn().prepare(
            "SELECT symbol_id, in_degree, out_degree, pagerank, betweenness FROM graph_metrics",
        )?;
        let mapped = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                GraphMetricsRow {
                    in_degree: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u32,
                    out_degree: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u32,
                    pagerank: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    betweenness: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                },
            ))
        })?;
        for row in mapped {
            let (symbol_id, metrics) = row?;
            rows.insert(symbol_id, metrics);
        }
        Ok((rows, approximate))
    }

    fn rebuild_graph_metrics(&self, graph: &SymbolGraph, cancel: &CancelToken) -> Result<bool> {
        let ranks = centrality::pagerank(graph, cancel)?;
        let (between, approximate) = centrality::betweenness(graph, cancel)?;
        let degrees = graph.degrees();

        let mut writer = Store::open(self.store.path())?;
        let tx = writer.conn_mut().transaction()?;
        tx.execute("DELETE FROM graph_metrics", [])?;
        for idx in 0..graph.len() {
            let node = graph.node(idx as u32);
            tx.execute(
                "INSERT INTO graph_metrics (symbol_id, in_degree, out_degree, pagerank, betweenness)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    node.id,
                    degrees[idx].0 as i64,
                    degrees[idx].1 as i64,
                    ranks.get(idx).copied().unwrap_or(0.0),
                    between.get(idx).copied().unwrap_or(0.0),
                ],
            )?;
        }
        tx.commit()?;
        Ok(approximate)
    }

    /// Build missing TF-IDF vectors before a semantic search.
    pub fn ensure_tfidf(&self) -> Result<usize> {
        let writer = Store::open(self.store.path())?;
        search::ensure_vectors(writer.conn())
    }

    /// Pagerank vector aligned with `graph`'s arena order.
    pub fn pagerank_vector(
        &self,
        graph: &SymbolGraph,
        cancel: &CancelToken,
    ) -> Result<Vec<f64>> {
        let (rows, _) = self.graph_metrics(graph, cancel)?;
        Ok((0..graph.len())
            .map(|idx| {
                rows.get(&graph.node(idx as u32).id)
                    .map(|r| r.pagerank)
                    .unwrap_or(0.0)
            })
            .collect())
    }
}
