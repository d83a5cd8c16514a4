//! Embedded relational store for the index.
//!
//! One SQLite database per project at `.roam/index.db`. Writes go
//! through short transactions held by a single writer; analyses open
//! read-only connections that run concurrently. WAL mode gives readers
//! snapshot-consistent views while a refresh is in progress.

mod schema;

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{Result, RoamError, SCHEMA_VERSION};

pub use schema::SCHEMA_SQL;

/// Handle to the index database.
///
/// `open` creates or upgrades the database and is used by the indexer;
/// `open_readonly` is used by analyses and fails with `IndexMissing`
/// when no database exists yet.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open the database read-write, creating the schema and applying
    /// forward migrations as needed.
    pub fn open(db_path: &Path) -> Result<Store> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        configure_connection(&conn)?;
        initialize_schema(&conn)?;
        migrate(&conn)?;
        Ok(Store {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    /// Open the database read-only for analyses.
    ///
    /// # Errors
    /// - `IndexMissing` when the database file does not exist.
    /// - `IndexVersionMismatch` when the schema version does not match
    ///   this engine build (recoverable by re-indexing).
    pub fn open_readonly(db_path: &Path) -> Result<Store> {
        if !db_path.exists() {
            return Err(RoamError::IndexMissing(db_path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let found = stored_version(&conn)?;
        if found != SCHEMA_VERSION {
            return Err(RoamError::IndexVersionMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(Store {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row counts for status-style summaries: (files, symbols, edges).
    pub fn counts(&self) -> Result<(i64, i64, i64)> {
        let files = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let symbols = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let edges = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok((files, symbols, edges))
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM schema_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    if existing.is_none() {
        conn.execute(
            "INSERT INTO schema_meta (id, version, created_at) VALUES (1, ?1, ?2)",
            params![
                SCHEMA_VERSION,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ],
        )?;
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<i64> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM schema_meta WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0))
}

/// Apply forward migrations from the stored version up to
/// [`SCHEMA_VERSION`]. A database newer than this engine fails the
/// version gate instead of being downgraded.
fn migrate(conn: &Connection) -> Result<()> {
    let mut version = stored_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(RoamError::IndexVersionMismatch {
            found: version,
            expected: SCHEMA_VERSION,
        });
    }
    let steps = schema::migrations();
    while version < SCHEMA_VERSION {
        let step = steps
            .get((version as usize).saturating_sub(1))
            .ok_or(RoamError::IndexVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            })?;
        conn.execute_batch(step)?;
        version += 1;
        conn.execute("UPDATE schema_meta SET version = ?1 WHERE id = 1", params![version])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("index.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_schema() {
        let (_dir, store) = scratch_store();
        let (files, symbols, edges) = store.counts().unwrap();
        assert_eq!((files, symbols, edges), (0, 0, 0));
    }

    #[test]
    fn test_readonly_open_requires_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("index.db");
        match Store::open_readonly(&missing) {
            Err(RoamError::IndexMissing(path)) => assert_eq!(path, missing),
            other => panic!("expected IndexMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_version_mismatch_on_stale_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("index.db");
        {
            let store = Store::open(&db).unwrap();
            store
                .conn()
                .execute("UPDATE schema_meta SET version = 99", [])
                .unwrap();
        }
        match Store::open_readonly(&db) {
            Err(RoamError::IndexVersionMismatch { found, expected }) => {
                assert_eq!(found, 99);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected IndexVersionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_cascade_delete_file_rows() {
        let (_dir, store) = scratch_store();
        let conn = store.conn();
        conn.execute(
            "INSERT INTO files (path, content_hash, language, line_count, indexed_at)
             VALUES ('a.py', 'h', 'python', 3, 't')",
            [],
        )
        .unwrap();
        let file_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO symbols (file_id, name, qualified_name, kind, line_start, line_end)
             VALUES (?1, 'foo', 'a.foo', 'function', 1, 2)",
            params![file_id],
        )
        .unwrap();
        let sym = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO edges (source_id, target_id, kind, line) VALUES (?1, ?1, 'call', 1)",
            params![sym],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO symbol_metrics (symbol_id, cognitive_complexity, nesting_depth,
                                         parameter_count, line_count)
             VALUES (?1, 1.0, 0, 0, 2)",
            params![sym],
        )
        .unwrap();

        conn.execute("DELETE FROM files WHERE id = ?1", params![file_id]).unwrap();
        let (files, symbols, edges) = store.counts().unwrap();
        assert_eq!((files, symbols, edges), (0, 0, 0));
        let metrics: i64 = conn
            .query_row("SELECT COUNT(*) FROM symbol_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(metrics, 0);
    }
}
