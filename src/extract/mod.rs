//! Extractor contract between the engine and per-language parsers.
//!
//! An extractor turns one file into symbol definitions and reference
//! edges. The engine is language-agnostic: it dispatches by file
//! extension through a lookup table built at construction, and treats
//! the records below as the entire interface. Symbols are totally
//! ordered by `line_start`; unknown kinds map to `Variable`.

pub mod python;
pub mod rust;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Language-agnostic symbol kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Variable,
    Type,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
            SymbolKind::Module => "module",
        }
    }

    /// Parse a kind string; unknown kinds map to `Variable` per the
    /// extractor contract.
    pub fn parse(text: &str) -> SymbolKind {
        match text {
            "function" | "fn" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "class" | "struct" | "enum" => SymbolKind::Class,
            "interface" | "trait" => SymbolKind::Interface,
            "type" | "typealias" | "type_alias" => SymbolKind::Type,
            "module" | "mod" => SymbolKind::Module,
            _ => SymbolKind::Variable,
        }
    }
}

/// Kind of a directed relation between two symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Call,
    Reference,
    Import,
    Inherit,
    TypeUse,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Call => "call",
            EdgeKind::Reference => "reference",
            EdgeKind::Import => "import",
            EdgeKind::Inherit => "inherit",
            EdgeKind::TypeUse => "type-use",
        }
    }

    pub fn parse(text: &str) -> EdgeKind {
        match text {
            "call" => EdgeKind::Call,
            "import" => EdgeKind::Import,
            "inherit" => EdgeKind::Inherit,
            "type-use" => EdgeKind::TypeUse,
            _ => EdgeKind::Reference,
        }
    }
}

/// One symbol definition reported by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolRecord {
    /// Canonical name within the file (scope path joined by the
    /// language's separator).
    pub qualified_name: String,
    pub name: String,
    pub kind: SymbolKind,
    /// 1-indexed, inclusive line range.
    pub line_start: u32,
    pub line_end: u32,
    /// Opaque signature text (declaration line for functions).
    pub signature: String,
    pub exported: bool,
    /// Qualified name of the enclosing symbol, for methods of classes.
    pub parent_qualified_name: Option<String>,
    /// Documentation text, when the language carries it adjacent to the
    /// definition. Feeds the semantic-search corpus.
    pub doc: Option<String>,
}

/// One reference edge reported by an extractor. `to` may name an
/// external symbol; unresolved targets are dropped during indexing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub line: u32,
}

/// Extraction result for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedFile {
    pub language: String,
    pub symbols: Vec<SymbolRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// A per-language parser.
///
/// Implementations must be pure: same `(path, source)` in, same records
/// out, no filesystem access, no shared state.
pub trait Extractor: Send + Sync {
    fn language(&self) -> &'static str;
    fn extensions(&self) -> &'static [&'static str];
    fn extract(&self, path: &Path, source: &str) -> Result<ParsedFile>;
}

/// Extension → extractor dispatch table.
#[derive(Clone)]
pub struct ExtractorSet {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn empty() -> Self {
        ExtractorSet {
            by_extension: HashMap::new(),
        }
    }

    /// The built-in table: Python and Rust.
    pub fn builtin() -> Self {
        let mut set = ExtractorSet::empty();
        set.register(Arc::new(python::PythonExtractor::new()));
        set.register(Arc::new(rust::RustExtractor::new()));
        set
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for ext in extractor.extensions() {
            self.by_extension
                .insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn Extractor>> {
        let ext = path.extension()?.to_str()?;
        self.by_extension.get(ext).cloned()
    }

    /// Whether any registered extractor handles this path.
    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

/// Sort symbols into the total order the contract requires and clamp
/// degenerate line ranges. Called by the indexer on every extractor
/// result so downstream code can rely on the ordering.
pub fn normalize_parsed(parsed: &mut ParsedFile) {
    for symbol in &mut parsed.symbols {
        if symbol.line_end < symbol.line_start {
            symbol.line_end = symbol.line_start;
        }
    }
    parsed
        .symbols
        .sort_by(|a, b| a.line_start.cmp(&b.line_start).then_with(|| a.qualified_name.cmp(&b.qualified_name)));
    parsed
        .edges
        .sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.from.cmp(&b.from)).then_with(|| a.to.cmp(&b.to)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_maps_to_variable() {
        assert_eq!(SymbolKind::parse("banana"), SymbolKind::Variable);
        assert_eq!(SymbolKind::parse("function"), SymbolKind::Function);
        assert_eq!(SymbolKind::parse("trait"), SymbolKind::Interface);
    }

    #[test]
    fn test_edge_kind_round_trip() {
        for kind in [
            EdgeKind::Call,
            EdgeKind::Reference,
            EdgeKind::Import,
            EdgeKind::Inherit,
            EdgeKind::TypeUse,
        ] {
            assert_eq!(EdgeKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_builtin_dispatch() {
        let set = ExtractorSet::builtin();
        assert!(set.supports(Path::new("app.py")));
        assert!(set.supports(Path::new("lib.rs")));
        assert!(!set.supports(Path::new("notes.txt")));
        assert!(!set.supports(Path::new("Makefile")));
    }

    #[test]
    fn test_parsed_file_round_trips_through_json() {
        let parsed = ParsedFile {
            language: "python".into(),
            symbols: vec![SymbolRecord {
                qualified_name: "db.open".into(),
                name: "open".into(),
                kind: SymbolKind::Function,
                line_start: 1,
                line_end: 3,
                signature: "def open()".into(),
                exported: true,
                parent_qualified_name: None,
                doc: Some("Open it.".into()),
            }],
            edges: vec![EdgeRecord {
                from: "db.open".into(),
                to: "pool.acquire".into(),
                kind: EdgeKind::Call,
                line: 2,
            }],
        };
        let json = serde_json::to_string(&parsed).unwrap();
        let back: ParsedFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbols, parsed.symbols);
        assert_eq!(back.edges, parsed.edges);
    }

    #[test]
    fn test_normalize_orders_by_line_start() {
        let mut parsed = ParsedFile {
            language: "test".into(),
            symbols: vec![
                SymbolRecord {
                    qualified_name: "b".into(),
                    name: "b".into(),
                    kind: SymbolKind::Function,
                    line_start: 9,
                    line_end: 3,
                    signature: String::new(),
                    exported: true,
                    parent_qualified_name: None,
                    doc: None,
                },
                SymbolRecord {
                    qualified_name: "a".into(),
                    name: "a".into(),
                    kind: SymbolKind::Function,
                    line_start: 1,
                    line_end: 4,
                    signature: String::new(),
                    exported: true,
                    parent_qualified_name: None,
                    doc: None,
                },
            ],
            edges: Vec::new(),
        };
        normalize_parsed(&mut parsed);
        assert_eq!(parsed.symbols[0].name, "a");
        // Degenerate range was clamped.
        assert_eq!(parsed.symbols[1].line_end, 9);
    }
}
