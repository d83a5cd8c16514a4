//! Breaking-change detection against a git ref.
//!
//! A change is breaking when an exported symbol was removed, its
//! signature changed, or its positional parameters were renamed or
//! reordered. Old file content comes from the git provider; both sides
//! are run through the same extractor.

use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use crate::cancel::CancelToken;
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::extract::{SymbolKind, SymbolRecord};

pub fn run(engine: &Engine, refspec: &str, cancel: &CancelToken) -> Result<Envelope> {
    let git = engine.git()?;
    let changed = if refspec == "HEAD" {
        git.changed_files(false)?
    } else {
        git.changed_since(refspec)?
    };

    let mut findings = Vec::new();
    let mut compared = 0usize;
    for path in &changed {
        cancel.check()?;
        let rel = Path::new(path);
        let Some(extractor) = engine.extractors().for_path(rel) else {
            continue;
        };
        let Some(old_text) = git.file_at_ref(path, refspec)? else {
            // New file: nothing to break.
            continue;
        };
        let new_text = std::fs::read_to_string(engine.root().join(path)).unwrap_or_default();
        compared += 1;

        let old = extractor.extract(rel, &old_text)?;
        let new = extractor.extract(rel, &new_text)?;
        let new_by_qname: HashMap<&str, &SymbolRecord> = new
            .symbols
            .iter()
            .map(|s| (s.qualified_name.as_str(), s))
            .collect();

        for symbol in &old.symbols {
            if !symbol.exported || symbol.kind == SymbolKind::Module {
                continue;
            }
            match new_by_qname.get(symbol.qualified_name.as_str()) {
                None => findings.push(json!({
                    "kind": "removed-export",
                    "symbol": symbol.qualified_name,
                    "file": path,
                    "detail": "exported symbol no longer present",
                })),
                Some(current) => {
                    if current.signature != symbol.signature {
                        let detail = parameter_change_detail(&symbol.signature, &current.signature);
                        findings.push(json!({
                            "kind": detail.0,
                            "symbol": symbol.qualified_name,
                            "file": path,
                            "detail": detail.1,
                            "old_signature": symbol.signature,
                            "new_signature": current.signature,
                        }));
                    }
                }
            }
        }
    }

    let verdict = if findings.is_empty() { "safe" } else { "breaking" };
    Ok(Envelope::new("breaking", verdict)
        .summary_field("ref", json!(refspec))
        .summary_field("files_compared", json!(compared))
        .summary_field("breaking_changes", json!(findings.len()))
        .payload_field("breaking", json!(findings)))
}

/// Classify a signature change: parameter rename/reorder vs a general
/// signature change.
fn parameter_change_detail(old: &str, new: &str) -> (&'static str, String) {
    let old_params = positional_parameters(old);
    let new_params = positional_parameters(new);
    if old_params.len() == new_params.len() && !old_params.is_empty() {
        let mut old_sorted = old_params.clone();
        let mut new_sorted = new_params.clone();
        old_sorted.sort();
        new_sorted.sort();
        if old_sorted == new_sorted && old_params != new_params {
            return (
                "parameters-reordered",
                format!("({}) became ({})", old_params.join(", "), new_params.join(", ")),
            );
        }
        if old_sorted != new_sorted {
            return (
                "parameters-renamed",
                format!("({}) became ({})", old_params.join(", "), new_params.join(", ")),
            );
        }
    }
    ("signature-changed", format!("`{old}` became `{new}`"))
}

/// Positional parameter names from an opaque signature string.
fn positional_parameters(signature: &str) -> Vec<String> {
    let Some(open) = signature.find('(') else {
        return Vec::new();
    };
    let Some(close) = signature.rfind(')') else {
        return Vec::new();
    };
    if close <= open + 1 {
        return Vec::new();
    }
    signature[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with('*') && *p != "self" && *p != "&self" && *p != "&mut self")
        .map(|p| {
            // Strip defaults and type annotations: `x: int = 1` -> `x`.
            p.split(['=', ':'])
                .next()
                .unwrap_or(p)
                .trim()
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_parameters() {
        assert_eq!(
            positional_parameters("def login(username, password=None)"),
            vec!["username", "password"]
        );
        assert_eq!(
            positional_parameters("fn open(&self, path: &Path)"),
            vec!["path"]
        );
        assert!(positional_parameters("class Pool").is_empty());
    }

    #[test]
    fn test_reorder_detection() {
        let (kind, _) = parameter_change_detail("def f(a, b)", "def f(b, a)");
        assert_eq!(kind, "parameters-reordered");
    }

    #[test]
    fn test_rename_detection() {
        let (kind, _) = parameter_change_detail("def f(a, b)", "def f(a, c)");
        assert_eq!(kind, "parameters-renamed");
    }

    #[test]
    fn test_general_signature_change() {
        let (kind, _) = parameter_change_detail("def f(a)", "def f(a, b)");
        assert_eq!(kind, "signature-changed");
    }
}
