//! Incremental indexer.
//!
//! Walks the workspace, hashes files, extracts changed ones on a rayon
//! worker pool, and drains the results through a single writer that
//! owns the storage write lock. Each file is replaced inside one
//! transaction so readers never observe a half-refreshed file. Edge
//! text is persisted per file (`raw_edges`) and the resolved `edges`
//! table is rebuilt in a second pass, which keeps cross-file edges
//! correct when only one side of a pair was re-extracted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{normalize_path, Config, INTERNAL_IGNORES};
use crate::error::{Result, RoamError};
use crate::extract::{normalize_parsed, ExtractorSet, ParsedFile};
use crate::graph::metrics::symbol_metrics_for;
use crate::store::Store;

/// Progress callback: (files done, files total).
pub type Progress<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Non-fatal problem recorded during indexing.
#[derive(Debug, Clone, Serialize)]
pub struct IndexWarning {
    pub path: String,
    pub message: String,
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_removed: usize,
    pub symbols_added: usize,
    pub symbols_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    pub edges_unresolved: usize,
    pub warnings: Vec<IndexWarning>,
    pub duration_ms: u64,
}

struct ExtractJob {
    rel_path: String,
    source: String,
    hash: String,
}

struct ExtractOutcome {
    rel_path: String,
    hash: String,
    line_count: u32,
    result: std::result::Result<ParsedFile, RoamError>,
    source: String,
}

/// Bring the index up to date with the tree under `root`.
///
/// A single file's extractor failure is isolated: its previous state is
/// preserved and a warning is recorded. Storage errors abort the call
/// and leave the prior state intact.
pub fn index_project(
    store: &mut Store,
    root: &Path,
    config: &Config,
    extractors: &ExtractorSet,
    progress: Option<Progress>,
) -> Result<IndexSummary> {
    let started = Instant::now();
    let mut summary = IndexSummary::default();

    let exclude = build_exclude_set(&config.ignore)?;
    let candidates = enumerate_files(root, extractors, &exclude);
    summary.files_scanned = candidates.len();

    let edges_before = edge_count(store.conn())?;

    let stored = stored_hashes(store.conn())?;
    let mut jobs = Vec::new();
    let mut seen = HashSet::new();
    for path in &candidates {
        let rel = normalize_path(root, path);
        seen.insert(rel.clone());
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                summary.warnings.push(IndexWarning {
                    path: rel,
                    message: format!("read failed: {e}"),
                });
                continue;
            }
        };
        let hash = hex::encode(Sha256::digest(&bytes));
        if stored.get(&rel).map(|h| h.as_str()) == Some(hash.as_str()) {
            continue;
        }
        jobs.push(ExtractJob {
            rel_path: rel,
            source: String::from_utf8_lossy(&bytes).into_owned(),
            hash,
        });
    }

    let total_jobs = jobs.len();
    debug!(files = summary.files_scanned, changed = total_jobs, "indexing");

    // Workers extract in parallel; one writer drains the channel and
    // owns the write lock.
    let (tx, rx) = mpsc::channel::<ExtractOutcome>();
    let conn = store.conn_mut();
    let writer_result = std::thread::scope(|scope| {
        let writer = scope.spawn(move || -> Result<WriterStats> {
            let mut stats = WriterStats::default();
            let mut done = 0usize;
            for outcome in rx {
                done += 1;
                if let Some(report) = progress {
                    report(done, total_jobs);
                }
                match &outcome.result {
                    Ok(parsed) => {
                        let (added, removed) = write_file(conn, &outcome, parsed.clone())?;
                        stats.files_changed += 1;
                        stats.symbols_added += added;
                        stats.symbols_removed += removed;
                    }
                    Err(e) => {
                        warn!(path = %outcome.rel_path, error = %e, "extractor failure");
                        stats.warnings.push(IndexWarning {
                            path: outcome.rel_path,
                            message: e.to_string(),
                        });
                    }
                }
            }
            Ok(stats)
        });

        jobs.into_par_iter().for_each_with(tx, |tx, job| {
            let outcome = run_extractor(extractors, root, job);
            // Writer hung up only on storage failure; nothing to do here.
            let _ = tx.send(outcome);
        });

        match writer.join() {
            Ok(result) => result,
            Err(_) => Err(RoamError::Io(std::io::Error::other(
                "indexer writer thread panicked",
            ))),
        }
    })?;

    summary.files_changed = writer_result.files_changed;
    summary.symbols_added = writer_result.symbols_added;
    summary.symbols_removed = writer_result.symbols_removed;
    summary.warnings.extend(writer_result.warnings);

    // Files present in the index but gone from disk.
    let conn = store.conn_mut();
    for (rel, _) in stored.iter() {
        if !seen.contains(rel) {
            let removed: i64 = conn.query_row(
                "SELECT COUNT(*) FROM symbols s JOIN files f ON s.file_id = f.id WHERE f.path = ?1",
                params![rel],
                |row| row.get(0),
            )?;
            conn.execute("DELETE FROM files WHERE path = ?1", params![rel])?;
            summary.files_removed += 1;
            summary.symbols_removed += removed as usize;
        }
    }

    // Second pass: rebuild resolved edges from persisted edge text.
    let (unresolved, unresolved_samples) = resolve_edges(conn)?;
    summary.edges_unresolved = unresolved;
    if config.strict {
        for (path, target) in unresolved_samples {
            summary.warnings.push(IndexWarning {
                path,
                message: format!("unresolved edge target: {target}"),
            });
        }
    }

    // Derived graph metrics go stale whenever membership changed; drop
    // them so the lazy rebuild recomputes on next read.
    if summary.files_changed > 0 || summary.files_removed > 0 {
        conn.execute("DELETE FROM graph_metrics", [])?;
    }

    let edges_after = edge_count(store.conn())?;
    summary.edges_added = (edges_after - edges_before).max(0) as usize;
    summary.edges_removed = (edges_before - edges_after).max(0) as usize;

    summary.duration_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}

#[derive(Default)]
struct WriterStats {
    files_changed: usize,
    symbols_added: usize,
    symbols_removed: usize,
    warnings: Vec<IndexWarning>,
}

fn run_extractor(extractors: &ExtractorSet, root: &Path, job: ExtractJob) -> ExtractOutcome {
    let abs = root.join(&job.rel_path);
    let rel = PathBuf::from(&job.rel_path);
    let line_count = job.source.lines().count().max(1) as u32;
    let result = match extractors.for_path(&abs) {
        Some(extractor) => extractor.extract(&rel, &job.source).map(|mut parsed| {
            normalize_parsed(&mut parsed);
            parsed
        }),
        None => Err(RoamError::ExtractorFailure {
            path: job.rel_path.clone(),
            message: "no extractor registered for extension".to_string(),
        }),
    };
    ExtractOutcome {
        rel_path: job.rel_path,
        hash: job.hash,
        line_count,
        result,
        source: job.source,
    }
}

/// Replace one file's rows atomically.
fn write_file(
    conn: &mut Connection,
    outcome: &ExtractOutcome,
    parsed: ParsedFile,
) -> Result<(usize, usize)> {
    let tx = conn.transaction()?;

    let existing: Option<i64> = {
        use rusqlite::OptionalExtension;
        tx.query_row(
            "SELECT id FROM files WHERE path = ?1",
            params![outcome.rel_path],
            |row| row.get(0),
        )
        .optional()?
    };

    let mut removed = 0usize;
    let file_id = match existing {
        Some(id) => {
            removed = tx.query_row(
                "SELECT COUNT(*) FROM symbols WHERE file_id = ?1",
                params![id],
                |row| row.get::<_, i64>(0),
            )? as usize;
            tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![id])?;
            tx.execute("DELETE FROM raw_edges WHERE file_id = ?1", params![id])?;
            tx.execute(
                "UPDATE files SET content_hash = ?2, language = ?3, line_count = ?4,
                                  indexed_at = ?5
                 WHERE id = ?1",
                params![id, outcome.hash, parsed.language, outcome.line_count, now()],
            )?;
            id
        }
        None => {
            tx.execute(
                "INSERT INTO files (path, content_hash, language, line_count, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    outcome.rel_path,
                    outcome.hash,
                    parsed.language,
                    outcome.line_count,
                    now()
                ],
            )?;
            tx.last_insert_rowid()
        }
    };

    let mut ids_by_qname: HashMap<&str, i64> = HashMap::new();
    for symbol in &parsed.symbols {
        tx.execute(
            "INSERT INTO symbols (file_id, name, qualified_name, kind, line_start, line_end,
                                  signature, doc, is_exported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                file_id,
                symbol.name,
                symbol.qualified_name,
                symbol.kind.as_str(),
                symbol.line_start,
                symbol.line_end,
                symbol.signature,
                symbol.doc,
                symbol.exported as i64,
            ],
        )?;
        let id = tx.last_insert_rowid();
        ids_by_qname.entry(symbol.qualified_name.as_str()).or_insert(id);

        let metrics = symbol_metrics_for(symbol, &outcome.source);
        tx.execute(
            "INSERT INTO symbol_metrics (symbol_id, cognitive_complexity, nesting_depth,
                                         parameter_count, line_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                metrics.cognitive_complexity,
                metrics.nesting_depth,
                metrics.parameter_count,
                metrics.line_count
            ],
        )?;
    }

    // Parent links once all ids are known.
    for symbol in &parsed.symbols {
        let (Some(parent_qname), Some(&id)) = (
            symbol.parent_qualified_name.as_deref(),
            ids_by_qname.get(symbol.qualified_name.as_str()),
        ) else {
            continue;
        };
        if let Some(&parent_id) = ids_by_qname.get(parent_qname) {
            tx.execute(
                "UPDATE symbols SET parent_id = ?2 WHERE id = ?1",
                params![id, parent_id],
            )?;
        }
    }

    for edge in &parsed.edges {
        tx.execute(
            "INSERT INTO raw_edges (file_id, from_qname, to_qname, kind, line)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![file_id, edge.from, edge.to, edge.kind.as_str(), edge.line],
        )?;
    }

    tx.commit()?;
    Ok((parsed.symbols.len(), removed))
}

struct SymbolRef {
    id: i64,
    file_id: i64,
    qualified_name: String,
    name: String,
    file_stem_path: String,
}

/// Rebuild the `edges` table from `raw_edges`.
///
/// Resolution order per target: exact match in the source file, unique
/// exact match across the index, unique match under the module prefix
/// spelled in the target, unique match on the final name segment.
/// Anything else is treated as an external reference and dropped.
fn resolve_edges(conn: &mut Connection) -> Result<(usize, Vec<(String, String)>)> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM edges", [])?;

    let mut symbols: Vec<SymbolRef> = Vec::new();
    {
        let mut stmt = tx.prepare(
            "SELECT s.id, s.file_id, s.qualified_name, s.name, f.path
             FROM symbols s JOIN files f ON s.file_id = f.id",
        )?;
        let rows = stmt.query_map([], |row| {
            let path: String = row.get(4)?;
            Ok(SymbolRef {
                id: row.get(0)?,
                file_id: row.get(1)?,
                qualified_name: row.get(2)?,
                name: row.get(3)?,
                file_stem_path: strip_extension(&path),
            })
        })?;
        for row in rows {
            symbols.push(row?);
        }
    }

    let mut by_file_qname: HashMap<(i64, &str), i64> = HashMap::new();
    let mut by_qname: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, sym) in symbols.iter().enumerate() {
        by_file_qname
            .entry((sym.file_id, sym.qualified_name.as_str()))
            .or_insert(sym.id);
        by_qname.entry(sym.qualified_name.as_str()).or_default().push(idx);
        by_name.entry(sym.name.as_str()).or_default().push(idx);
    }

    struct RawEdge {
        file_id: i64,
        from_qname: String,
        to_qname: String,
        kind: String,
        line: Option<i64>,
        file_path: String,
    }
    let mut raw: Vec<RawEdge> = Vec::new();
    {
        let mut stmt = tx.prepare(
            "SELECT r.file_id, r.from_qname, r.to_qname, r.kind, r.line, f.path
             FROM raw_edges r JOIN files f ON r.file_id = f.id
             ORDER BY f.path, r.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawEdge {
                file_id: row.get(0)?,
                from_qname: row.get(1)?,
                to_qname: row.get(2)?,
                kind: row.get(3)?,
                line: row.get(4)?,
                file_path: row.get(5)?,
            })
        })?;
        for row in rows {
            raw.push(row?);
        }
    }

    let mut unresolved = 0usize;
    let mut samples: Vec<(String, String)> = Vec::new();
    for edge in &raw {
        let Some(&source_id) = by_file_qname.get(&(edge.file_id, edge.from_qname.as_str())) else {
            continue;
        };
        let target = resolve_target(edge.file_id, &edge.to_qname, &symbols, &by_file_qname, &by_qname, &by_name);
        match target {
            Some(target_id) => {
                tx.execute(
                    "INSERT INTO edges (source_id, target_id, kind, line)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![source_id, target_id, edge.kind, edge.line],
                )?;
            }
            None => {
                unresolved += 1;
                if samples.len() < 50 {
                    samples.push((edge.file_path.clone(), edge.to_qname.clone()));
                }
            }
        }
    }

    tx.commit()?;
    Ok((unresolved, samples))
}

fn resolve_target(
    file_id: i64,
    to_qname: &str,
    symbols: &[SymbolRef],
    by_file_qname: &HashMap<(i64, &str), i64>,
    by_qname: &HashMap<&str, Vec<usize>>,
    by_name: &HashMap<&str, Vec<usize>>,
) -> Option<i64> {
    if let Some(&id) = by_file_qname.get(&(file_id, to_qname)) {
        return Some(id);
    }
    if let Some(matches) = by_qname.get(to_qname) {
        if matches.len() == 1 {
            return Some(symbols[matches[0]].id);
        }
    }

    let segments = split_segments(to_qname);
    let last = *segments.last()?;
    let candidates = by_name.get(last)?;

    if segments.len() > 1 {
        // `db.connection.open_database`: the prefix names the module;
        // match it against the owning file's extension-less path.
        let prefix = segments[..segments.len() - 1].join("/");
        let matched: Vec<&SymbolRef> = candidates
            .iter()
            .map(|&idx| &symbols[idx])
            .filter(|sym| {
                sym.file_stem_path == prefix || sym.file_stem_path.ends_with(&format!("/{prefix}"))
            })
            .collect();
        if matched.len() == 1 {
            return Some(matched[0].id);
        }
    }

    if candidates.len() == 1 {
        return Some(symbols[candidates[0]].id);
    }
    None
}

fn split_segments(qname: &str) -> Vec<&str> {
    qname
        .split("::")
        .flat_map(|part| part.split('.'))
        .filter(|part| !part.is_empty())
        .collect()
}

fn strip_extension(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem.to_string(),
        _ => path.to_string(),
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn edge_count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?)
}

fn stored_hashes(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT path, content_hash FROM files")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut map = HashMap::new();
    for row in rows {
        let (path, hash): (String, String) = row?;
        map.insert(path, hash);
    }
    Ok(map)
}

fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RoamError::Config(format!("bad ignore glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RoamError::Config(format!("ignore globs: {e}")))
}

/// Enumerate candidate files under `root` in sorted order.
///
/// Honours `.gitignore`, the internal ignore list, and the configured
/// exclude globs; only files with a registered extractor qualify.
fn enumerate_files(root: &Path, extractors: &ExtractorSet, exclude: &GlobSet) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ignore::WalkBuilder::new(root)
        .follow_links(false)
        .build()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            let rel = normalize_path(root, path);
            if rel
                .split('/')
                .any(|component| INTERNAL_IGNORES.contains(&component))
            {
                return false;
            }
            if exclude.is_match(&rel) {
                return false;
            }
            extractors.supports(path)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments_handles_both_separators() {
        assert_eq!(split_segments("db.connection.open"), vec!["db", "connection", "open"]);
        assert_eq!(split_segments("store::Store::open"), vec!["store", "Store", "open"]);
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("db/connection.py"), "db/connection");
        assert_eq!(strip_extension("no_ext"), "no_ext");
        assert_eq!(strip_extension("dir.d/file"), "dir.d/file");
    }
}
