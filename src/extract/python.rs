//! Python extraction using tree-sitter-python.
//!
//! Reports functions, methods, classes, and module-level variables,
//! plus call, inherit, and import edges. Pure function of
//! `(path, source)`; parse failures return an empty record set rather
//! than an error so one odd file cannot poison an indexing run.

use std::path::Path;

use anyhow::anyhow;

use crate::error::{Result, RoamError};
use crate::extract::{EdgeKind, EdgeRecord, Extractor, ParsedFile, SymbolKind, SymbolRecord};

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        PythonExtractor
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PythonExtractor {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn extract(&self, path: &Path, source: &str) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
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
            owners: vec![module_qname.clone()],
            in_class: Vec::new(),
        };

        let root = tree.root_node();
        let module_doc = walker.leading_docstring(&root);
        walker.symbols.push(SymbolRecord {
            qualified_name: module_qname.clone(),
            name: module_name(path),
            kind: SymbolKind::Module,
            line_start: 1,
            line_end: line_count,
            signature: String::new(),
            exported: true,
            parent_qualified_name: None,
            doc: module_doc,
        });

        walker.walk(root);

        Ok(ParsedFile {
            language: self.language().to_string(),
            symbols: walker.symbols,
            edges: walker.edges,
        })
    }
}

/// Dotted module path from a (root-relative) file path:
/// `db/connection.py` → `db.connection`.
fn module_qualified_name(path: &Path) -> String {
    let no_ext = path.with_extension("");
    no_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != ".")
        .collect::<Vec<_>>()
        .join(".")
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string())
}

struct Walker<'a> {
    source: &'a [u8],
    symbols: Vec<SymbolRecord>,
    edges: Vec<EdgeRecord>,
    /// In-file scope components for qualified names.
    scope: Vec<String>,
    /// Qualified names of enclosing symbols; edges attach to the top.
    owners: Vec<String>,
    /// Whether each open scope level is a class body.
    in_class: Vec<bool>,
}

impl<'a> Walker<'a> {
    fn text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(self.source).unwrap_or("")
    }

    fn line(&self, node: tree_sitter::Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn qualified(&self, name: &str) -> String {
        if self.scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.scope.join("."), name)
        }
    }

    fn walk(&mut self, node: tree_sitter::Node) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: tree_sitter::Node) {
        match node.kind() {
            "decorated_definition" => {
                // Transparent container; the inner definition carries
                // its own position.
                self.walk(node);
            }
            "function_definition" => self.visit_function(node),
            "class_definition" => self.visit_class(node),
            "import_statement" | "import_from_statement" => self.visit_import(node),
            "call" => {
                self.visit_call(node);
                self.walk(node);
            }
            "expression_statement" | "assignment" => {
                if node.kind() == "expression_statement" {
                    if let Some(inner) = node.named_child(0) {
                        if inner.kind() == "assignment" {
                            self.visit_assignment(inner);
                        }
                    }
                }
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
        let is_method = self.in_class.last().copied().unwrap_or(false);

        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.text(p).to_string())
            .unwrap_or_else(|| "()".to_string());
        let return_type = node
            .child_by_field_name("return_type")
            .map(|r| format!(" -> {}", self.text(r)))
            .unwrap_or_default();
        let signature = format!("def {name}{params}{return_type}");

        let doc = node
            .child_by_field_name("body")
            .and_then(|body| self.leading_docstring(&body));

        self.symbols.push(SymbolRecord {
            qualified_name: qualified.clone(),
            name: name.clone(),
            kind: if is_method {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            },
            line_start: self.line(node),
            line_end: node.end_position().row as u32 + 1,
            signature,
            exported: !name.starts_with('_'),
            parent_qualified_name: if is_method {
                Some(self.scope.join("."))
            } else {
                None
            },
            doc,
        });

        self.scope.push(name);
        self.owners.push(qualified);
        self.in_class.push(false);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.in_class.pop();
        self.owners.pop();
        self.scope.pop();
    }

    fn visit_class(&mut self, node: tree_sitter::Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.walk(node);
        };
        let name = self.text(name_node).to_string();
        let qualified = self.qualified(&name);

        let bases = node.child_by_field_name("superclasses");
        let signature = match bases {
            Some(b) => format!("class {name}{}", self.text(b)),
            None => format!("class {name}"),
        };
        let doc = node
            .child_by_field_name("body")
            .and_then(|body| self.leading_docstring(&body));

        self.symbols.push(SymbolRecord {
            qualified_name: qualified.clone(),
            name: name.clone(),
            kind: SymbolKind::Class,
            line_start: self.line(node),
            line_end: node.end_position().row as u32 + 1,
            signature,
            exported: !name.starts_with('_'),
            parent_qualified_name: None,
            doc,
        });

        if let Some(bases) = bases {
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                if matches!(base.kind(), "identifier" | "attribute") {
                    self.edges.push(EdgeRecord {
                        from: qualified.clone(),
                        to: self.text(base).to_string(),
                        kind: EdgeKind::Inherit,
                        line: self.line(base),
                    });
                }
            }
        }

        self.scope.push(name);
        self.owners.push(qualified);
        self.in_class.push(true);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.in_class.pop();
        self.owners.pop();
        self.scope.pop();
    }

    fn visit_call(&mut self, node: tree_sitter::Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let target = match function.kind() {
            "identifier" => self.text(function).to_string(),
            // `db.query(...)` / `self.helper(...)`: keep the dotted
            // chain; the resolver strips `self.` and matches suffixes.
            "attribute" => self.text(function).to_string(),
            _ => return,
        };
        if target.is_empty() {
            return;
        }
        let from = match self.owners.last() {
            Some(owner) => owner.clone(),
            None => return,
        };
        self.edges.push(EdgeRecord {
            from,
            to: target.trim_start_matches("self.").to_string(),
            kind: EdgeKind::Call,
            line: self.line(node),
        });
    }

    fn visit_import(&mut self, node: tree_sitter::Node) {
        let from = match self.owners.last() {
            Some(owner) => owner.clone(),
            None => return,
        };
        let line = self.line(node);

        if node.kind() == "import_statement" {
            // import a.b [as c]
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let target = match child.kind() {
                    "dotted_name" => self.text(child).to_string(),
                    "aliased_import" => child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default(),
                    _ => continue,
                };
                if !target.is_empty() {
                    self.edges.push(EdgeRecord {
                        from: from.clone(),
                        to: target,
                        kind: EdgeKind::Import,
                        line,
                    });
                }
            }
            return;
        }

        // from x.y import a, b
        let module = node
            .child_by_field_name("module_name")
            .map(|m| self.text(m).trim_start_matches('.').to_string())
            .unwrap_or_default();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let imported = match child.kind() {
                "dotted_name" if Some(child) != node.child_by_field_name("module_name") => {
                    self.text(child).to_string()
                }
                "aliased_import" => child
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default(),
                "wildcard_import" => String::new(),
                _ => continue,
            };
            if imported.is_empty() {
                continue;
            }
            let target = if module.is_empty() {
                imported
            } else {
                format!("{module}.{imported}")
            };
            self.edges.push(EdgeRecord {
                from: from.clone(),
                to: target,
                kind: EdgeKind::Import,
                line,
            });
        }
    }

    fn visit_assignment(&mut self, node: tree_sitter::Node) {
        // Module-level `NAME = ...` only.
        if !self.scope.is_empty() {
            return;
        }
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }
        let name = self.text(left).to_string();
        if self.symbols.iter().any(|s| s.qualified_name == name) {
            return;
        }
        self.symbols.push(SymbolRecord {
            qualified_name: name.clone(),
            name: name.clone(),
            kind: SymbolKind::Variable,
            line_start: self.line(node),
            line_end: self.line(node),
            signature: String::new(),
            exported: !name.starts_with('_'),
            parent_qualified_name: None,
            doc: None,
        });
    }

    /// Docstring: a string expression as the first statement of a block.
    fn leading_docstring(&self, body: &tree_sitter::Node) -> Option<String> {
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != "string" {
            return None;
        }
        let text = self
            .text(string)
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> ParsedFile {
        PythonExtractor::new()
            .extract(Path::new("db/connection.py"), source)
            .unwrap()
    }

    #[test]
    fn test_module_symbol_and_function() {
        let parsed = extract("def open_database():\n    '''Open a connection.'''\n    pass\n");
        assert_eq!(parsed.language, "python");
        assert_eq!(parsed.symbols[0].kind, SymbolKind::Module);
        assert_eq!(parsed.symbols[0].qualified_name, "db.connection");
        let func = &parsed.symbols[1];
        assert_eq!(func.name, "open_database");
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.doc.as_deref(), Some("Open a connection."));
        assert!(func.exported);
    }

    #[test]
    fn test_methods_carry_parent() {
        let parsed = extract(
            "class Pool:\n    def get(self):\n        pass\n    def _drop(self):\n        pass\n",
        );
        let get = parsed.symbols.iter().find(|s| s.name == "get").unwrap();
        assert_eq!(get.kind, SymbolKind::Method);
        assert_eq!(get.qualified_name, "Pool.get");
        assert_eq!(get.parent_qualified_name.as_deref(), Some("Pool"));
        let drop = parsed.symbols.iter().find(|s| s.name == "_drop").unwrap();
        assert!(!drop.exported);
    }

    #[test]
    fn test_call_edges_attach_to_enclosing_function() {
        let parsed = extract("def serve():\n    return query()\n");
        let edge = parsed
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Call)
            .unwrap();
        assert_eq!(edge.from, "serve");
        assert_eq!(edge.to, "query");
    }

    #[test]
    fn test_import_edges_from_module() {
        let parsed = extract("from db.pool import acquire\nimport os\n");
        let imports: Vec<_> = parsed
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Import)
            .collect();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].from, "db.connection");
        assert_eq!(imports[0].to, "db.pool.acquire");
        assert_eq!(imports[1].to, "os");
    }

    #[test]
    fn test_inherit_edge() {
        let parsed = extract("class Child(Base):\n    pass\n");
        let edge = parsed
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Inherit)
            .unwrap();
        assert_eq!(edge.from, "Child");
        assert_eq!(edge.to, "Base");
    }

    #[test]
    fn test_signature_has_parameters() {
        let parsed = extract("def login(username, password):\n    pass\n");
        let func = parsed.symbols.iter().find(|s| s.name == "login").unwrap();
        assert_eq!(func.signature, "def login(username, password)");
    }
}
