//! Indexer behaviour: incrementality, removal, and failure isolation.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{scratch_project, ScriptExtractor};
use roam::config::{index_db_path, Config};
use roam::indexer::index_project;
use roam::{Extractor, ExtractorSet, ParsedFile, Store};

fn extractors() -> ExtractorSet {
    let mut set = ExtractorSet::builtin();
    set.register(Arc::new(ScriptExtractor));
    set
}

fn index(dir: &tempfile::TempDir) -> (Store, roam::IndexSummary) {
    let mut store = Store::open(&index_db_path(dir.path())).unwrap();
    let summary = index_project(
        &mut store,
        dir.path(),
        &Config::default(),
        &extractors(),
        None,
    )
    .unwrap();
    (store, summary)
}

/// Snapshot of content-bearing columns, ignoring row ids.
fn row_snapshot(store: &Store) -> Vec<String> {
    let mut rows = Vec::new();
    let conn = store.conn();
    let mut stmt = conn
        .prepare(
            "SELECT f.path, s.qualified_name, s.kind, s.line_start, s.line_end, s.is_exported
             FROM symbols s JOIN files f ON s.file_id = f.id
             ORDER BY f.path, s.line_start, s.qualified_name",
        )
        .unwrap();
    let mapped = stmt
        .query_map([], |row| {
            Ok(format!(
                "{}|{}|{}|{}|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .unwrap();
    for row in mapped {
        rows.push(row.unwrap());
    }
    let mut stmt = conn
        .prepare(
            "SELECT ss.qualified_name, ts.qualified_name, e.kind, e.line
             FROM edges e
             JOIN symbols ss ON e.source_id = ss.id
             JOIN symbols ts ON e.target_id = ts.id
             ORDER BY ss.qualified_name, ts.qualified_name, e.line",
        )
        .unwrap();
    let mapped = stmt
        .query_map([], |row| {
            Ok(format!(
                "{}->{}|{}|{:?}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })
        .unwrap();
    for row in mapped {
        rows.push(row.unwrap());
    }
    rows
}

#[test]
fn test_index_builds_symbols_and_edges() {
    let dir = scratch_project(&[("a.x", "fn foo -> bar\n"), ("b.x", "fn bar\n")]);
    let (store, summary) = index(&dir);

    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.files_changed, 2);
    assert_eq!(summary.symbols_added, 2);
    let (files, symbols, edges) = store.counts().unwrap();
    assert_eq!((files, symbols, edges), (2, 2, 1));
}

#[test]
fn test_reindex_unchanged_is_a_no_op() {
    let dir = scratch_project(&[("a.x", "fn foo -> bar\n"), ("b.x", "fn bar\n")]);
    let (store, _) = index(&dir);
    let before = row_snapshot(&store);
    drop(store);

    let (store, summary) = index(&dir);
    assert_eq!(summary.files_changed, 0);
    assert_eq!(summary.symbols_added, 0);
    assert_eq!(summary.files_removed, 0);
    assert_eq!(row_snapshot(&store), before);
}

#[test]
fn test_changed_file_is_replaced_atomically() {
    let dir = scratch_project(&[("a.x", "fn foo -> bar\n"), ("b.x", "fn bar\n")]);
    let (store, _) = index(&dir);
    drop(store);

    std::fs::write(dir.path().join("a.x"), "fn foo -> bar\nfn extra\n").unwrap();
    let (store, summary) = index(&dir);
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.symbols_added, 2);
    assert_eq!(summary.symbols_removed, 1);
    let (_, symbols, edges) = store.counts().unwrap();
    assert_eq!(symbols, 3);
    // Cross-file edge survives the partial refresh.
    assert_eq!(edges, 1);
}

#[test]
fn test_removed_file_leaves_no_rows() {
    let dir = scratch_project(&[("a.x", "fn foo -> bar\n"), ("b.x", "fn bar\n")]);
    let (store, _) = index(&dir);
    drop(store);

    std::fs::remove_file(dir.path().join("b.x")).unwrap();
    let (store, summary) = index(&dir);
    assert_eq!(summary.files_removed, 1);

    let conn = store.conn();
    let files: i64 = conn
        .query_row("SELECT COUNT(*) FROM files WHERE path = 'b.x'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(files, 0);
    let symbols: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM symbols WHERE qualified_name = 'bar'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(symbols, 0);
    // foo's edge to bar is gone with its target.
    let (_, _, edges) = store.counts().unwrap();
    assert_eq!(edges, 0);
}

#[test]
fn test_unresolved_edges_are_dropped() {
    let dir = scratch_project(&[("a.x", "fn foo -> os_getenv\n")]);
    let (store, summary) = index(&dir);
    assert_eq!(summary.edges_unresolved, 1);
    let (_, _, edges) = store.counts().unwrap();
    assert_eq!(edges, 0);
}

#[test]
fn test_strict_mode_surfaces_unresolved_edges() {
    let dir = scratch_project(&[("a.x", "fn foo -> os_getenv\n")]);
    let mut store = Store::open(&index_db_path(dir.path())).unwrap();
    let config = Config {
        strict: true,
        ..Config::default()
    };
    let summary = index_project(&mut store, dir.path(), &config, &extractors(), None).unwrap();
    assert!(summary
        .warnings
        .iter()
        .any(|w| w.message.contains("unresolved edge")));
}

/// Extractor that always fails, for failure-isolation coverage.
struct FailingExtractor;

impl Extractor for FailingExtractor {
    fn language(&self) -> &'static str {
        "broken"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["broken"]
    }

    fn extract(&self, path: &Path, _source: &str) -> roam::Result<ParsedFile> {
        Err(roam::RoamError::ExtractorFailure {
            path: path.display().to_string(),
            message: "synthetic failure".to_string(),
        })
    }
}

#[test]
fn test_extractor_failure_is_isolated() {
    let dir = scratch_project(&[("ok.x", "fn fine\n"), ("bad.broken", "anything\n")]);
    let mut set = extractors();
    set.register(Arc::new(FailingExtractor));

    let mut store = Store::open(&index_db_path(dir.path())).unwrap();
    let summary =
        index_project(&mut store, dir.path(), &Config::default(), &set, None).unwrap();

    // The healthy file indexed; the broken one produced a warning.
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].path.contains("bad.broken"));
    let (files, symbols, _) = store.counts().unwrap();
    assert_eq!((files, symbols), (1, 1));
}

#[test]
fn test_ignore_list_skips_vendor_directories() {
    let dir = scratch_project(&[
        ("src.x", "fn real\n"),
        ("node_modules/dep.x", "fn vendored\n"),
        (".roam/stale.x", "fn stale\n"),
    ]);
    let (store, summary) = index(&dir);
    assert_eq!(summary.files_scanned, 1);
    let (files, _, _) = store.counts().unwrap();
    assert_eq!(files, 1);
}
