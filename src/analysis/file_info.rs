//! Per-file view: metadata, symbols, and dependency counts.

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;

pub fn run(engine: &Engine, path: &str, cancel: &CancelToken) -> Result<Envelope> {
    cancel.check()?;
    let normalized = path.replace('\\', "/");
    use rusqlite::OptionalExtension;
    let row: Option<(i64, String, String, i64, String)> = engine
        .conn()
        .query_row(
            "SELECT id, path, language, line_count, indexed_at FROM files WHERE path = ?1",
            [&normalized],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;
    let row = match row {
        Some(row) => Some(row),
        None => engine
            .conn()
            .query_row(
                "SELECT id, path, language, line_count, indexed_at FROM files
                 WHERE path LIKE ?1 ORDER BY path LIMIT 1",
                [format!("%{normalized}")],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?,
    };

    let Some((file_id, full_path, language, line_count, indexed_at)) = row else {
        return Ok(Envelope::new("file", "not-found")
            .summary_field("path", json!(normalized))
            .payload_field("symbols", json!([])));
    };

    let mut stmt = engine.conn().prepare(
        "SELECT s.name, s.qualified_name, s.kind, s.line_start, s.line_end, s.is_exported,
                m.cognitive_complexity
         FROM symbols s
         LEFT JOIN symbol_metrics m ON m.symbol_id = s.id
         WHERE s.file_id = ?1
         ORDER BY s.line_start",
    )?;
    let rows = stmt.query_map([file_id], |row| {
        Ok(json!({
            "name": row.get::<_, String>(0)?,
            "qualified_name": row.get::<_, String>(1)?,
            "kind": row.get::<_, String>(2)?,
            "line_start": row.get::<_, i64>(3)?,
            "line_end": row.get::<_, i64>(4)?,
            "exported": row.get::<_, i64>(5)? != 0,
            "complexity": row.get::<_, Option<f64>>(6)?,
        }))
    })?;
    let mut symbols = Vec::new();
    for row in rows {
        symbols.push(row?);
    }

    let out_files: i64 = engine.conn().query_row(
        "SELECT COUNT(DISTINCT ts.file_id) FROM edges e
         JOIN symbols ss ON e.source_id = ss.id
         JOIN symbols ts ON e.target_id = ts.id
         WHERE ss.file_id = ?1 AND ts.file_id != ?1",
        [file_id],
        |row| row.get(0),
    )?;
    let in_files: i64 = engine.conn().query_row(
        "SELECT COUNT(DISTINCT ss.file_id) FROM edges e
         JOIN symbols ss ON e.source_id = ss.id
         JOIN symbols ts ON e.target_id = ts.id
         WHERE ts.file_id = ?1 AND ss.file_id != ?1",
        [file_id],
        |row| row.get(0),
    )?;

    Ok(Envelope::new("file", "found")
        .summary_field("path", json!(full_path))
        .summary_field("language", json!(language))
        .summary_field("lines", json!(line_count))
        .summary_field("symbols", json!(symbols.len()))
        .payload_field("indexed_at", json!(indexed_at))
        .payload_field("symbols", json!(symbols))
        .payload_field("imports_files", json!(out_files))
        .payload_field("imported_by_files", json!(in_files)))
}
