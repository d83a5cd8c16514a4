//! roam: codebase comprehension engine.
//!
//! Indexes a source tree into an embedded SQLite store under
//! `<project>/.roam/`, derives a symbol-level dependency graph, and
//! answers analytical queries over it: health, blast radius, dead
//! code, complexity, coupling, architectural fitness, semantic search,
//! and preflight change-risk.
//!
//! The library is consumed by the `roam` CLI; every command maps to a
//! pure function of (engine, parameters) → envelope.

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod fitness;
pub mod gitio;
pub mod graph;
pub mod indexer;
pub mod search;
pub mod store;

pub use cancel::CancelToken;
pub use config::{find_project_root, index_db_path, Config};
pub use engine::Engine;
pub use envelope::{validate_envelope, Envelope};
pub use error::{Result, RoamError};
pub use extract::{EdgeKind, Extractor, ExtractorSet, ParsedFile, SymbolKind};
pub use indexer::{IndexSummary, IndexWarning};
pub use store::Store;
