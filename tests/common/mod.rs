//! Shared helpers for integration tests: scratch projects and a tiny
//! line-oriented extractor so graph shapes can be spelled out exactly.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use roam::extract::{EdgeKind, EdgeRecord, SymbolKind, SymbolRecord};
use roam::{Engine, Extractor, ExtractorSet, ParsedFile};

/// Extractor for `.x` files. One definition per line:
///
/// ```text
/// fn foo -> bar, baz     # function foo calling bar and baz
/// hidden fn helper       # not exported
/// ```
pub struct ScriptExtractor;

impl Extractor for ScriptExtractor {
    fn language(&self) -> &'static str {
        "script"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["x"]
    }

    fn extract(&self, _path: &Path, source: &str) -> roam::Result<ParsedFile> {
        let mut parsed = ParsedFile {
            language: "script".to_string(),
            ..Default::default()
        };
        for (row, line) in source.lines().enumerate() {
            let line_no = row as u32 + 1;
            let trimmed = line.trim();
            let (exported, rest) = match trimmed.strip_prefix("hidden ") {
                Some(rest) => (false, rest),
                None => (true, trimmed),
            };
            let Some(rest) = rest.strip_prefix("fn ") else {
                continue;
            };
            let (name, callees) = match rest.split_once("->") {
                Some((name, callees)) => (name.trim(), callees),
                None => (rest.trim(), ""),
            };
            parsed.symbols.push(SymbolRecord {
                qualified_name: name.to_string(),
                name: name.to_string(),
                kind: SymbolKind::Function,
                line_start: line_no,
                line_end: line_no,
                signature: format!("fn {name}()"),
                exported,
                parent_qualified_name: None,
                doc: None,
            });
            for callee in callees.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                parsed.edges.push(EdgeRecord {
                    from: name.to_string(),
                    to: callee.to_string(),
                    kind: EdgeKind::Call,
                    line: line_no,
                });
            }
        }
        Ok(parsed)
    }
}

/// Write `files` under a fresh temp dir and return it.
pub fn scratch_project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().expect("temp dir");
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(full, content).expect("write fixture");
    }
    dir
}

/// Open an engine over the project with the script extractor
/// registered alongside the built-ins. Indexes on first open.
pub fn open_engine(dir: &tempfile::TempDir) -> Engine {
    let mut set = ExtractorSet::builtin();
    set.register(Arc::new(ScriptExtractor));
    Engine::with_extractors(dir.path(), set).expect("engine open")
}
