//! Project configuration and the flat YAML dialect.
//!
//! Persistent state lives under `<project>/.roam/`. The optional
//! `config.yaml` carries the ignore list, entry-point patterns, and
//! test-path patterns. Both it and `fitness.yaml` are parsed by a
//! deliberately minimal dialect:
//!
//! - top-level `key: value` scalars,
//! - `key:` followed by `- item` string lists,
//! - `key:` followed by `- name: ...` blocks of flat `key: value` pairs.
//!
//! Nested mappings and anchors are outside the subset and are reported
//! as a configuration error, never silently truncated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, RoamError};

/// Directory name for per-project state.
pub const ROAM_DIR: &str = ".roam";

/// Database file name inside [`ROAM_DIR`].
pub const INDEX_DB: &str = "index.db";

/// Directories never indexed, regardless of configuration.
pub const INTERNAL_IGNORES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".roam",
    "node_modules",
    "vendor",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
];

const DEFAULT_TEST_PATTERNS: &[&str] = &[
    "**/tests/**",
    "**/__tests__/**",
    "**/*_test.*",
    "**/*.spec.*",
    "**/test_*.*",
];

const DEFAULT_ENTRY_POINTS: &[&str] = &[
    "main",
    "__main__",
    "__init__",
    "new",
    "setup",
    "teardown",
    "handler",
    "lambda_handler",
    "application",
    "wsgi",
    "asgi",
];

/// Engine configuration resolved from `.roam/config.yaml` plus defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Extra exclude globs on top of [`INTERNAL_IGNORES`].
    pub ignore: Vec<String>,
    /// Symbol names treated as live regardless of in-degree.
    pub entry_points: Vec<String>,
    /// Globs marking test files.
    pub test_patterns: Vec<String>,
    /// Surface unresolved edges as indexing warnings.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ignore: Vec::new(),
            entry_points: DEFAULT_ENTRY_POINTS.iter().map(|s| s.to_string()).collect(),
            test_patterns: DEFAULT_TEST_PATTERNS.iter().map(|s| s.to_string()).collect(),
            strict: false,
        }
    }
}

impl Config {
    /// Load configuration for `root`, falling back to defaults when no
    /// `config.yaml` is present. Keys `ignore`, `entry_points`,
    /// `test_patterns` replace the defaults wholesale; `strict` is a
    /// scalar bool.
    pub fn load(root: &Path) -> Result<Config> {
        let mut config = Config::default();
        let Some(path) = existing_config_path(root) else {
            return Ok(config);
        };

        let text = std::fs::read_to_string(&path)?;
        let doc = parse_flat_document(&text)?;

        if let Some(items) = doc.lists.get("ignore") {
            config.ignore = items.clone();
        }
        if let Some(items) = doc.lists.get("entry_points") {
            config.entry_points = items.clone();
        }
        if let Some(items) = doc.lists.get("test_patterns") {
            config.test_patterns = items.clone();
        }
        if let Some(ScalarValue::Bool(strict)) = doc.scalars.get("strict") {
            config.strict = *strict;
        }

        Ok(config)
    }
}

fn existing_config_path(root: &Path) -> Option<PathBuf> {
    for name in ["config.yaml", "config.yml"] {
        let candidate = root.join(ROAM_DIR).join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Resolve the project root.
///
/// `ROAM_PROJECT_ROOT` wins when set; otherwise walk upward from the
/// current directory looking for an existing `.roam/` or `.git/`, and
/// fall back to the current directory itself.
pub fn find_project_root() -> PathBuf {
    if let Ok(root) = std::env::var("ROAM_PROJECT_ROOT") {
        if !root.is_empty() {
            return PathBuf::from(root);
        }
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut dir = cwd.as_path();
    loop {
        if dir.join(ROAM_DIR).is_dir() || dir.join(".git").is_dir() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return cwd,
        }
    }
}

/// Path of the index database for `root`.
pub fn index_db_path(root: &Path) -> PathBuf {
    root.join(ROAM_DIR).join(INDEX_DB)
}

/// Normalise a path for storage: root-relative, forward slashes.
pub fn normalize_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let text = relative.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

// ---------------------------------------------------------------------
// Flat YAML dialect
// ---------------------------------------------------------------------

/// Scalar value in the flat dialect, with bool/number coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ScalarValue {
    fn parse(raw: &str) -> ScalarValue {
        let unquoted = raw.trim().trim_matches('"').trim_matches('\'');
        match unquoted.to_ascii_lowercase().as_str() {
            "true" => return ScalarValue::Bool(true),
            "false" => return ScalarValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = unquoted.parse::<i64>() {
            return ScalarValue::Int(n);
        }
        if let Ok(f) = unquoted.parse::<f64>() {
            return ScalarValue::Float(f);
        }
        ScalarValue::Str(unquoted.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int(n) => Some(*n as f64),
            ScalarValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Parsed flat document: scalars, string lists, and lists of flat maps.
#[derive(Debug, Default)]
pub struct FlatDocument {
    pub scalars: BTreeMap<String, ScalarValue>,
    pub lists: BTreeMap<String, Vec<String>>,
    pub blocks: BTreeMap<String, Vec<BTreeMap<String, ScalarValue>>>,
}

/// Parse the flat dialect. Constructs outside the subset (nested
/// mappings, anchors, multi-level indentation) raise a `Config` error
/// naming the offending line.
pub fn parse_flat_document(text: &str) -> Result<FlatDocument> {
    let mut doc = FlatDocument::default();
    let mut current_key: Option<String> = None;
    let mut current_block: Option<BTreeMap<String, ScalarValue>> = None;

    for (line_no, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if stripped.contains('&') && stripped.contains('*') || stripped.starts_with("<<") {
            return Err(RoamError::Config(format!(
                "line {}: YAML anchors are outside the supported subset",
                line_no + 1
            )));
        }

        if let Some(item) = stripped.strip_prefix("- ") {
            let key = current_key.clone().ok_or_else(|| {
                RoamError::Config(format!("line {}: list item without a key", line_no + 1))
            })?;
            if let Some((item_key, item_value)) = split_key_value(item) {
                // `- name: ...` starts a new block entry under the key.
                if let Some(block) = current_block.take() {
                    doc.blocks.entry(key.clone()).or_default().push(block);
                }
                let mut block = BTreeMap::new();
                block.insert(item_key, ScalarValue::parse(&item_value));
                current_block = Some(block);
            } else {
                doc.lists
                    .entry(key)
                    .or_default()
                    .push(ScalarValue::parse(item).as_str().unwrap_or(item).to_string());
            }
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if let Some((key, value)) = split_key_value(stripped) {
            if indented {
                // Continuation of the current block entry.
                match current_block.as_mut() {
                    Some(block) => {
                        block.insert(key, ScalarValue::parse(&value));
                    }
                    None => {
                        return Err(RoamError::Config(format!(
                            "line {}: nested mappings are outside the supported subset",
                            line_no + 1
                        )));
                    }
                }
                continue;
            }

            // New top-level key: flush any open block list.
            if let Some(block) = current_block.take() {
                if let Some(list_key) = current_key.take() {
                    doc.blocks.entry(list_key).or_default().push(block);
                }
            }
            if value.is_empty() {
                current_key = Some(key);
            } else {
                current_key = None;
                doc.scalars.insert(key, ScalarValue::parse(&value));
            }
            continue;
        }

        return Err(RoamError::Config(format!(
            "line {}: expected `key: value`, a `- ` list item, or a comment",
            line_no + 1
        )));
    }

    if let Some(block) = current_block.take() {
        if let Some(list_key) = current_key.take() {
            doc.blocks.entry(list_key).or_default().push(block);
        }
    }

    Ok(doc)
}

fn split_key_value(text: &str) -> Option<(String, String)> {
    let (key, value) = text.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars_and_lists() {
        let doc = parse_flat_document(
            "strict: true\n\
             # comment\n\
             ignore:\n\
             - generated/**\n\
             - '*.min.js'\n\
             entry_points:\n\
             - main\n",
        )
        .unwrap();
        assert_eq!(doc.scalars.get("strict"), Some(&ScalarValue::Bool(true)));
        assert_eq!(
            doc.lists.get("ignore").unwrap(),
            &vec!["generated/**".to_string(), "*.min.js".to_string()]
        );
        assert_eq!(doc.lists.get("entry_points").unwrap(), &vec!["main".to_string()]);
    }

    #[test]
    fn test_parse_rule_blocks() {
        let doc = parse_flat_document(
            "rules:\n\
             - name: \"No cycles\"\n\
             \x20\x20type: metric\n\
             \x20\x20metric: cycles\n\
             \x20\x20max: 0\n\
             - name: layering\n\
             \x20\x20type: dependency\n\
             \x20\x20from: handlers/**\n\
             \x20\x20to: db/**\n\
             \x20\x20allow: false\n",
        )
        .unwrap();
        let rules = doc.blocks.get("rules").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].get("name").unwrap().as_str(), Some("No cycles"));
        assert_eq!(rules[0].get("max").unwrap().as_f64(), Some(0.0));
        assert_eq!(rules[1].get("allow").unwrap().as_bool(), Some(false));
    }

    #[test]
    fn test_nested_mapping_is_an_error() {
        let err = parse_flat_document("outer:\n  inner: 1\n").unwrap_err();
        assert!(err.to_string().contains("subset"), "{err}");
    }

    #[test]
    fn test_anchor_is_an_error() {
        assert!(parse_flat_document("base: &anchor *x\n").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.test_patterns.iter().any(|p| p == "**/tests/**"));
        assert!(config.entry_points.iter().any(|p| p == "main"));
        assert!(!config.strict);
    }

    #[test]
    fn test_normalize_path() {
        let root = Path::new("/project");
        assert_eq!(
            normalize_path(root, Path::new("/project/src/app.py")),
            "src/app.py"
        );
    }
}
