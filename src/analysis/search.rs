//! Symbol search: substring lookup and TF-IDF semantic queries.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::search as tfidf_search;

const SUBSTRING_LIMIT: usize = 50;
pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// Case-insensitive substring search over names and qualified names.
pub fn substring(engine: &Engine, query: &str, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let pattern = format!("%{}%", query.replace('%', "\\%"));
    let mut stmt = engine.conn().prepare(
        "SELECT s.name, s.qualified_name, s.kind, f.path, s.line_start
         FROM symbols s JOIN files f ON s.file_id = f.id
         WHERE s.name LIKE ?1 OR s.qualified_name LIKE ?1
         ORDER BY length(s.name), s.qualified_name
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![pattern, SUBSTRING_LIMIT as i64], |row| {
        Ok(json!({
            "name": row.get::<_, String>(0)?,
            "qualified_name": row.get::<_, String>(1)?,
            "kind": row.get::<_, String>(2)?,
            "file": row.get::<_, String>(3)?,
            "line": row.get::<_, i64>(4)?,
        }))
    })?;
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }

    let verdict = if results.is_empty() { "not-found" } else { "found" };
    Ok(Envelope::new("search", verdict)
        .summary_field("query", json!(query))
        .summary_field("matches", json!(results.len()))
        .payload_field("results", json!(results)))
}

/// TF-IDF cosine search over symbol documentation.
pub fn semantic(
    engine: &Engine,
    query: &str,
    top_k: usize,
    threshold: f64,
    cancel: &CancelToken,
) -> Result<Envelope> {
    cancel.check()?;
    engine.ensure_tfidf()?;
    let hits = tfidf_search::search_stored(engine.conn(), query, top_k, threshold)?;

    let verdict = if hits.is_empty() { "no-matches" } else { "matches" };
    Ok(Envelope::new("search-semantic", verdict)
        .summary_field("query", json!(query))
        .summary_field("matches", json!(hits.len()))
        .payload_field("results", json!(hits)))
}
