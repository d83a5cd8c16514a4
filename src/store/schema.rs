//! SQLite schema for the index.
//!
//! Per-file replacement relies on `ON DELETE CASCADE`: deleting a file
//! row removes its symbols, which removes their edges, metrics, and
//! TF-IDF vectors in the same transaction. `raw_edges` keeps the
//! extractor-reported edge text per file so incremental refreshes can
//! re-resolve cross-file edges without re-parsing unchanged files.

/// Schema applied when creating a fresh database (version 1).
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_meta (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    version     INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    id            INTEGER PRIMARY KEY,
    path          TEXT NOT NULL UNIQUE,
    content_hash  TEXT NOT NULL,
    language      TEXT NOT NULL,
    line_count    INTEGER NOT NULL DEFAULT 0,
    indexed_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS symbols (
    id              INTEGER PRIMARY KEY,
    file_id         INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    qualified_name  TEXT NOT NULL,
    kind            TEXT NOT NULL,
    line_start      INTEGER NOT NULL,
    line_end        INTEGER NOT NULL,
    signature       TEXT NOT NULL DEFAULT '',
    doc             TEXT,
    is_exported     INTEGER NOT NULL DEFAULT 0,
    parent_id       INTEGER REFERENCES symbols(id) ON DELETE SET NULL
);
CREATE INDEX IF NOT EXISTS idx_symbols_file  ON symbols(file_id);
CREATE INDEX IF NOT EXISTS idx_symbols_qname ON symbols(qualified_name);
CREATE INDEX IF NOT EXISTS idx_symbols_name  ON symbols(name);

CREATE TABLE IF NOT EXISTS edges (
    id         INTEGER PRIMARY KEY,
    source_id  INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    target_id  INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    line       INTEGER
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

CREATE TABLE IF NOT EXISTS raw_edges (
    id          INTEGER PRIMARY KEY,
    file_id     INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    from_qname  TEXT NOT NULL,
    to_qname    TEXT NOT NULL,
    kind        TEXT NOT NULL,
    line        INTEGER
);
CREATE INDEX IF NOT EXISTS idx_raw_edges_file ON raw_edges(file_id);

CREATE TABLE IF NOT EXISTS symbol_metrics (
    symbol_id             INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    cognitive_complexity  REAL NOT NULL,
    nesting_depth         INTEGER NOT NULL,
    parameter_count       INTEGER NOT NULL,
    line_count            INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS graph_metrics (
    symbol_id    INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    in_degree    INTEGER,
    out_degree   INTEGER,
    pagerank     REAL,
    betweenness  REAL
);

CREATE TABLE IF NOT EXISTS symbol_tfidf (
    symbol_id  INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
    vector     TEXT NOT NULL
);
";

/// Forward migrations, indexed by the version they upgrade FROM.
/// `migrations()[0]` upgrades version 1 to version 2, and so on.
/// Empty today; the machinery exists so older databases upgrade in
/// place instead of failing the version gate.
pub fn migrations() -> &'static [&'static str] {
    &[]
}
