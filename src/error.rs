//! Error kinds for the roam engine.
//!
//! Errors are classified by cause, not by the layer that raised them.
//! Recoverable conditions (missing index, stale schema) carry enough
//! context for the CLI to print a remediation hint; storage and I/O
//! errors bubble up unchanged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Current schema version expected by this engine build.
pub const SCHEMA_VERSION: i64 = 1;

/// Error type for all engine operations.
#[derive(Debug, Error)]
pub enum RoamError {
    /// No index database present. Recoverable by running `roam index`.
    #[error("no index found at {0}; run `roam index` first")]
    IndexMissing(PathBuf),

    /// Index schema does not match this engine build. Recoverable by re-indexing.
    #[error("index schema version {found} does not match engine version {expected}; run `roam index` to rebuild")]
    IndexVersionMismatch { found: i64, expected: i64 },

    /// A single file failed extraction. Non-fatal; recorded in the index summary.
    #[error("extractor failed on {path}: {message}")]
    ExtractorFailure { path: String, message: String },

    /// No path exists between two symbols. Returned as a structured
    /// envelope by `trace`, never as a process failure.
    #[error("no path from {src} to {tgt}")]
    PathNotFound { src: String, tgt: String },

    /// Symbol lookup matched nothing.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// Cooperative cancellation was observed at an algorithm loop top.
    #[error("operation cancelled")]
    Cancelled,

    /// A per-analysis wall-clock deadline expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Bad command-line or configuration input.
    #[error("usage error: {0}")]
    Usage(String),

    /// `.roam/fitness.yaml` or `.roam/config.yaml` could not be understood.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying SQLite failure. Fatal for the current command.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Git provider failure (repository missing, bad ref).
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Filesystem failure. Fatal for the current command.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoamError {
    /// Process exit code for this error at the CLI boundary.
    ///
    /// 2 = usage error, 3 = index/storage error. Fitness violations are
    /// not errors and are signalled separately with exit code 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            RoamError::Usage(_) | RoamError::Config(_) => 2,
            _ => 3,
        }
    }

    /// Whether an analysis may catch this error and convert it into a
    /// structured envelope instead of failing the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RoamError::PathNotFound { .. }
                | RoamError::SymbolNotFound(_)
                | RoamError::Cancelled
                | RoamError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RoamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RoamError::Usage("bad flag".into()).exit_code(), 2);
        assert_eq!(RoamError::Config("nested yaml".into()).exit_code(), 2);
        assert_eq!(
            RoamError::IndexMissing(PathBuf::from(".roam/index.db")).exit_code(),
            3
        );
        assert_eq!(
            RoamError::IndexVersionMismatch {
                found: 0,
                expected: SCHEMA_VERSION
            }
            .exit_code(),
            3
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(RoamError::SymbolNotFound("foo".into()).is_recoverable());
        assert!(RoamError::Cancelled.is_recoverable());
        assert!(!RoamError::IndexMissing(PathBuf::new()).is_recoverable());
    }
}
