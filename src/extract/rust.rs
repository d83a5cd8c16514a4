//! Rust extraction using tree-sitter-rust.
//!
//! Reports functions, methods (impl blocks), structs/enums, traits,
//! modules, type aliases, and consts, plus call, import (`use`),
//! inherit (trait impl), and type-use edges.

use std::path::Path;

use anyhow::anyhow;

use crate::error::{Result, RoamError};
use crate::extract::{EdgeKind, EdgeRecord, Extractor, ParsedFile, SymbolKind, SymbolRecord};

pub struct RustExtractor;

impl RustExtractor {
    pub fn new() -> Self {
        RustExtractor
    }
}

impl Default for RustExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for RustExtractor {
    fn language(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn extract(&self, path: &Path, source: &str) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_rust::language())
            .map_err(|e| RoamError::ExtractorFailure {
                path: path.display().to_string(),
                message: anyhow!(e).to_string(),
            })?;

        let tree = match parser.parse(source, None) {
            Some(tree) => tree,
            None => return Ok(ParsedFile::default()),
        };

        let module_qname = module_qualified_name(path);
        let line_count = source.lines().count().max(1) as u32;

        let mut walker = Walker {
            source: source.as_bytes(),
            symbols: Vec::new(),
            edges: Vec::new(),
            scope: Vec::new(),
            scope_kinds: Vec::new(),
            owners: vec![module_qname.clone()],
        };

        walker.symbols.push(SymbolRecord {
            qualified_name: module_qname,
            name: module_name(path),
            kind: SymbolKind::Module,
            line_start: 1,
            line_end: line_count,
            signature: String::new(),
            exported: true,
            parent_qualified_name: None,
            doc: None,
        });

        walker.walk(tree.root_node());

        Ok(ParsedFile {
            language: self.language().to_string(),
            symbols: walker.symbols,
            edges: walker.edges,
        })
    }
}

/// `src/store/mod.rs` → `src::store::mod`.
fn module_qualified_name(path: &Path) -> String {
    let no_ext = path.with_extension("");
    no_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join("::")
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}

/// What kind of construct opened each scope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Type,
    Function,
}

struct Walker<'a> {
    source: &'a [u8],
    symbols: Vec<SymbolRecord>,
    edges: Vec<EdgeRecord>,
    scope: Vec<String>,
    scope_kinds: Vec<ScopeKind>,
    owners: Vec<String>,
}

impl<'a> Walker<'a> {
    fn text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn line(&self, node: tree_sitter::Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn end_line(&self, node: tree_sitter::Node) -> u32 {
        node.end_position().row as u32 + 1
    }

    fn qualified(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.scope.join("::"), name)
        }
    }

    fn is_public(&self, node: tree_sitter::Node) -> bool {
        let mut cursor = node.walk();
        let result = node.children(&mut cursor)
            .any(|c| c.kind() == "visibility_modifier");
        result
    }

    /// Contiguous `///` comments immediately above the item.
    fn doc_comment(&self, node: tree_sitter::Node) -> Option<String> {
        let mut lines = Vec::new();
        let mut sibling = node.prev_sibling();
        while let Some(prev) = sibling {
            if prev.kind() != "line_comment" {
                break;
            }
            let text = self.text(prev);
            let Some(stripped) = text.strip_prefix("///") else {
                break;
            };
            lines.push(stripped.trim().to_string());
            sibling = prev.prev_sibling();
        }
        if lines.is_empty() {
            return None;
        }
        lines.reverse();
        Some(lines.join(" "))
    }

    fn walk(&mut self, node: tree_sitter::Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: tree_sitter::Node) {
        match node.kind() {
            "function_item" => self.visit_function(node),
            "struct_item" | "enum_item" | "union_item" => {
                self.visit_named_item(node, SymbolKind::Class)
            }
            "trait_item" => self.visit_trait(node),
            "impl_item" => self.visit_impl(node),
            "mod_item" => self.visit_mod(node),
            "type_item" => self.visit_named_item(node, SymbolKind::Type),
            "const_item" | "static_item" => self.visit_named_item(node, SymbolKind::Variable),
            "use_declaration" => self.visit_use(node),
            "call_expression" => {
                self.visit_call(node);
                self.walk(node);
            }
            _ => self.walk(node),
        }
    }

    fn visit_function(&mut self, node: tree_sitter::Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.walk(node);
        };
        let name = self.text(name_node).to_string();
        let qualified = self.qualified(&name);
        // Inside an impl or trait scope a function is a method.
        let is_method = self.scope_kinds.last() == Some(&ScopeKind::Type);

        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.text(p).to_string())
            .unwrap_or_else(|| "()".to_string());
        let return_type = node
            .child_by_field_name("return_type")
            .map(|r| format!(" -> {}", self.text(r)))
            .unwrap_or_default();
        let signature = format!("fn {name}{params}{return_type}");

        self.symbols.push(SymbolRecord {
            qualified_name: qualified.clone(),
            name,
            kind: if is_method {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            },
            line_start: self.line(node),
            line_end: self.end_line(node),
            signature,
            exported: self.is_public(node),
            parent_qualified_name: if is_method {
                Some(self.scope.join("::"))
            } else {
                None
            },
            doc: self.doc_comment(node),
        });

        // Type-use edges from the declared parameter and return types.
        for field in ["parameters", "return_type"] {
            if let Some(types) = node.child_by_field_name(field) {
                self.collect_type_uses(&qualified, types);
            }
        }

        self.scope.push(self.text(name_node).to_string());
        self.scope_kinds.push(ScopeKind::Function);
        self.owners.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.owners.pop();
        self.scope_kinds.pop();
        self.scope.pop();
    }

    fn visit_named_item(&mut self, node: tree_sitter::Node, kind: SymbolKind) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let keyword = node.kind().trim_end_matches("_item");
        self.symbols.push(SymbolRecord {
            qualified_name: self.qualified(&name),
            name: name.clone(),
            kind,
            line_start: self.line(node),
            line_end: self.end_line(node),
            signature: format!("{keyword} {name}"),
            exported: self.is_public(node),
            parent_qualified_name: None,
            doc: self.doc_comment(node),
        });
    }

    fn visit_trait(&mut self, node: tree_sitter::Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified = self.qualified(&name);
        self.symbols.push(SymbolRecord {
            qualified_name: qualified.clone(),
            name: name.clone(),
            kind: SymbolKind::Interface,
            line_start: self.line(node),
            line_end: self.end_line(node),
            signature: format!("trait {name}"),
            exported: self.is_public(node),
            parent_qualified_name: None,
            doc: self.doc_comment(node),
        });

        self.scope.push(name);
        self.scope_kinds.push(ScopeKind::Type);
        self.owners.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.owners.pop();
        self.scope_kinds.pop();
        self.scope.pop();
    }

    fn visit_impl(&mut self, node: tree_sitter::Node) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return self.walk(node);
        };
        let type_name = base_type_name(self.text(type_node));
        let type_qualified = self.qualified(&type_name);

        if let Some(trait_node) = node.child_by_field_name("trait") {
            self.edges.push(EdgeRecord {
                from: type_qualified.clone(),
                to: self.text(trait_node).to_string(),
                kind: EdgeKind::Inherit,
                line: self.line(node),
            });
        }

        self.scope.push(type_name);
        self.scope_kinds.push(ScopeKind::Type);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.scope_kinds.pop();
        self.scope.pop();
    }

    fn visit_mod(&mut self, node: tree_sitter::Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node).to_string();
        let qualified = self.qualified(&name);
        self.symbols.push(SymbolRecord {
            qualified_name: qualified.clone(),
            name: name.clone(),
            kind: SymbolKind::Module,
            line_start: self.line(node),
            line_end: self.end_line(node),
            signature: format!("mod {name}"),
            exported: self.is_public(node),
            parent_qualified_name: None,
            doc: self.doc_comment(node),
        });

        self.scope.push(name);
        self.scope_kinds.push(ScopeKind::Module);
        self.owners.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.owners.pop();
        self.scope_kinds.pop();
        self.scope.pop();
    }

    fn visit_use(&mut self, node: tree_sitter::Node) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        let from = match self.owners.first() {
            Some(owner) => owner.clone(),
            None => return,
        };
        let line = self.line(node);
        let mut targets = Vec::new();
        collect_use_targets(self, argument, "", &mut targets);
        for target in targets {
            let trimmed = target
                .trim_start_matches("crate::")
                .trim_start_matches("self::")
                .trim_start_matches("super::")
                .to_string();
            if trimmed.is_empty() || trimmed == "*" {
                continue;
            }
            self.edges.push(EdgeRecord {
                from: from.clone(),
                to: trimmed,
                kind: EdgeKind::Import,
                line,
            });
        }
    }

    fn visit_call(&mut self, node: tree_sitter::Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let target = match function.kind() {
            "identifier" | "scoped_identifier" => self.text(function).to_string(),
            "field_expression" => function
                .child_by_field_name("field")
                .map(|f| self.text(f).to_string())
                .unwrap_or_default(),
            "generic_function" => function
                .child_by_field_name("function")
                .map(|f| self.text(f).to_string())
                .unwrap_or_default(),
            _ => return,
        };
        if target.is_empty() {
            return;
        }
        let Some(from) = self.owners.last().cloned() else {
            return;
        };
        self.edges.push(EdgeRecord {
            from,
            to: target,
            kind: EdgeKind::Call,
            line: self.line(node),
        });
    }

    fn collect_type_uses(&mut self, from: &str, node: tree_sitter::Node) {
        if node.kind() == "type_identifier" {
            let name = self.text(node).to_string();
            self.edges.push(EdgeRecord {
                from: from.to_string(),
                to: name,
                kind: EdgeKind::TypeUse,
                line: self.line(node),
            });
            return;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect_type_uses(from, child);
        }
    }
}

/// `Engine<'a>` → `Engine`; `Vec<T>` → `Vec`.
fn base_type_name(text: &str) -> String {
    text.split('<').next().unwrap_or(text).trim().to_string()
}

/// Flatten a `use` argument into leaf paths.
fn collect_use_targets(walker: &Walker, node: tree_sitter::Node, prefix: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "scoped_identifier" | "crate" | "self" | "super" => {
            let text = walker.text(node);
            out.push(join_path(prefix, text));
        }
        "use_as_clause" => {
            if let Some(path) = node.child_by_field_name("path") {
                collect_use_targets(walker, path, prefix, out);
            }
        }
        "scoped_use_list" => {
            let new_prefix = node
                .child_by_field_name("path")
                .map(|p| join_path(prefix, walker.text(p)))
                .unwrap_or_else(|| prefix.to_string());
            if let Some(list) = node.child_by_field_name("list") {
                collect_use_targets(walker, list, &new_prefix, out);
            }
        }
        "use_list" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_use_targets(walker, child, prefix, out);
            }
        }
        "use_wildcard" => {}
        _ => {}
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}::{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ParsedFile {
        RustExtractor::new()
            .extract(Path::new("src/store.rs"), source)
            .unwrap()
    }

    #[test]
    fn test_function_and_visibility() {
        let parsed = extract("pub fn open() {}\nfn helper() {}\n");
        let open = parsed.symbols.iter().find(|s| s.name == "open").unwrap();
        assert!(open.exported);
        assert_eq!(open.kind, SymbolKind::Function);
        let helper = parsed.symbols.iter().find(|s| s.name == "helper").unwrap();
        assert!(!helper.exported);
    }

    #[test]
    fn test_impl_methods_have_parent() {
        let parsed = extract(
            "pub struct Store;\nimpl Store {\n    pub fn open() -> Store { Store }\n}\n",
        );
        let open = parsed.symbols.iter().find(|s| s.name == "open").unwrap();
        assert_eq!(open.kind, SymbolKind::Method);
        assert_eq!(open.qualified_name, "Store::open");
        assert_eq!(open.parent_qualified_name.as_deref(), Some("Store"));
    }

    #[test]
    fn test_trait_impl_emits_inherit_edge() {
        let parsed = extract(
            "pub trait Extractor {}\npub struct Py;\nimpl Extractor for Py {}\n",
        );
        let edge = parsed
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Inherit)
            .unwrap();
        assert_eq!(edge.from, "Py");
        assert_eq!(edge.to, "Extractor");
    }

    #[test]
    fn test_call_edges() {
        let parsed = extract("fn a() { b(); }\nfn b() {}\n");
        let edge = parsed.edges.iter().find(|e| e.kind == EdgeKind::Call).unwrap();
        assert_eq!(edge.from, "a");
        assert_eq!(edge.to, "b");
    }

    #[test]
    fn test_use_declaration_targets() {
        let parsed = extract("use crate::store::{Store, open};\n");
        let imports: Vec<_> = parsed
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Import)
            .map(|e| e.to.clone())
            .collect();
        assert!(imports.contains(&"store::Store".to_string()), "{imports:?}");
        assert!(imports.contains(&"store::open".to_string()));
    }

    #[test]
    fn test_doc_comments_collected() {
        let parsed = extract("/// Opens the database.\n/// Second line.\npub fn open() {}\n");
        let open = parsed.symbols.iter().find(|s| s.name == "open").unwrap();
        assert_eq!(open.doc.as_deref(), Some("Opens the database. Second line."));
    }
}
