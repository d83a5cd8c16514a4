//! TF-IDF semantic search over symbol names, docs, and signatures.
//!
//! Corpus: per symbol, name tokens (split on camel/snake boundaries)
//! ++ docstring tokens ++ signature identifier tokens. TF is raw count
//! over document length; IDF is smoothed `ln((N+1)/(df+1)) + 1`.
//! Sparse vectors are cached in `symbol_tfidf` as JSON and dropped
//! whenever the owning file is re-extracted.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;

/// Stopwords: English closed-class plus programming closed-class.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "of", "to", "from", "in", "on", "for", "with", "return", "function",
    "class", "def", "var", "let", "const",
];

/// Fraction of missing rows above which the whole corpus is rebuilt
/// (IDF drift after large-scale changes).
const FULL_REBUILD_THRESHOLD: f64 = 0.2;

/// Tokenise text: split on camelCase and snake_case boundaries and
/// non-alphanumeric separators, lowercase, drop stopwords, fold the
/// suffixes -ing/-ed/-s when the stem keeps length >= 3.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in split_identifiers(text) {
        let lower = raw.to_lowercase();
        if lower.len() < 2 || STOPWORDS.contains(&lower.as_str()) {
            continue;
        }
        if lower.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        tokens.push(fold_suffix(&lower));
    }
    tokens
}

/// Split on non-alphanumerics and camelCase humps: `openDatabase` →
/// ["open", "Database"], `open_database` → ["open", "database"].
fn split_identifiers(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && previous_lower && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        } else {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            previous_lower = false;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn fold_suffix(token: &str) -> String {
    for suffix in ["ing", "ed", "s"] {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.len() >= 3 {
                return stem.to_string();
            }
        }
    }
    token.to_string()
}

/// Cosine similarity of two sparse vectors. `cos(v, v) == 1` for any
/// non-empty v; anything involving an empty vector is 0.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    dot / (norm_a * norm_b)
}

struct CorpusDoc {
    symbol_id: i64,
    tokens: Vec<String>,
}

fn load_corpus(conn: &Connection) -> Result<Vec<CorpusDoc>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, doc, signature FROM symbols ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut docs = Vec::new();
    for row in rows {
        let (symbol_id, name, doc, signature) = row?;
        let mut tokens = tokenize(&name);
        if let Some(doc) = doc {
            tokens.extend(tokenize(&doc));
        }
        tokens.extend(tokenize(&signature));
        docs.push(CorpusDoc { symbol_id, tokens });
    }
    Ok(docs)
}

fn document_frequencies(docs: &[CorpusDoc]) -> HashMap<String, usize> {
    let mut df: HashMap<String, usize> = HashMap::new();
    for doc in docs {
        let mut seen: Vec<&str> = doc.tokens.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        for term in seen {
            *df.entry(term.to_string()).or_insert(0) += 1;
        }
    }
    df
}

fn idf(df: usize, n: usize) -> f64 {
    (((n + 1) as f64) / ((df + 1) as f64)).ln() + 1.0
}

fn vector_for(tokens: &[String], df: &HashMap<String, usize>, n: usize) -> HashMap<String, f64> {
    if tokens.is_empty() {
        return HashMap::new();
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }
    let length = tokens.len() as f64;
    counts
        .into_iter()
        .map(|(term, count)| {
            let tf = count as f64 / length;
            let term_idf = idf(df.get(term).copied().unwrap_or(0), n);
            (term.to_string(), tf * term_idf)
        })
        .collect()
}

/// Build vectors for symbols missing a `symbol_tfidf` row. When more
/// than 20% of symbols lack rows the whole corpus is rebuilt so stored
/// IDF weights track the current index. Returns rows written.
pub fn ensure_vectors(conn: &Connection) -> Result<usize> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
    if total == 0 {
        return Ok(0);
    }
    let missing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM symbols s
         LEFT JOIN symbol_tfidf t ON s.id = t.symbol_id
         WHERE t.symbol_id IS NULL",
        [],
        |row| row.get(0),
    )?;
    if missing == 0 {
        return Ok(0);
    }

    let rebuild_all = missing as f64 / total as f64 > FULL_REBUILD_THRESHOLD;
    let docs = load_corpus(conn)?;
    let df = document_frequencies(&docs);
    let n = docs.len();

    let mut written = 0usize;
    for doc in &docs {
        if !rebuild_all {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM symbol_tfidf WHERE symbol_id = ?1",
                params![doc.symbol_id],
                |row| row.get(0),
            )?;
            if exists > 0 {
                continue;
            }
        }
        let vector = vector_for(&doc.tokens, &df, n);
        let json = serde_json::to_string(&vector)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        conn.execute(
            "INSERT OR REPLACE INTO symbol_tfidf (symbol_id, vector) VALUES (?1, ?2)",
            params![doc.symbol_id, json],
        )?;
        written += 1;
    }
    Ok(written)
}

/// One semantic search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub symbol_id: i64,
    pub name: String,
    pub qualified_name: String,
    pub kind: String,
    pub path: String,
    pub line: u32,
    pub score: f64,
}

/// Query the stored vectors with cosine similarity.
///
/// The query vector uses the same tokeniser; its IDF comes from term
/// presence across the stored vectors so query and corpus weights
/// agree. Results are sorted by descending score, bounded by `top_k`,
/// and filtered by `threshold`.
pub fn search_stored(
    conn: &Connection,
    query: &str,
    top_k: usize,
    threshold: f64,
) -> Result<Vec<SearchHit>> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return Ok(Vec::new());
    }

    struct StoredVector {
        symbol_id: i64,
        vector: HashMap<String, f64>,
    }
    let mut stored = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT symbol_id, vector FROM symbol_tfidf ORDER BY symbol_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (symbol_id, json) = row?;
            let vector: HashMap<String, f64> = serde_json::from_str(&json).unwrap_or_default();
            stored.push(StoredVector { symbol_id, vector });
        }
    }
    if stored.is_empty() {
        return Ok(Vec::new());
    }

    let n = stored.len();
    let mut df: HashMap<String, usize> = HashMap::new();
    for entry in &stored {
        for term in entry.vector.keys() {
            *df.entry(term.clone()).or_insert(0) += 1;
        }
    }
    let query_vector = vector_for(&query_tokens, &df, n);

    let mut scored: Vec<(i64, f64)> = stored
        .iter()
        .map(|entry| (entry.symbol_id, cosine_similarity(&query_vector, &entry.vector)))
        .filter(|&(_, score)| score > threshold && score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);

    let mut hits = Vec::with_capacity(scored.len());
    for (symbol_id, score) in scored {
        let hit = conn.query_row(
            "SELECT s.name, s.qualified_name, s.kind, f.path, s.line_start
             FROM symbols s JOIN files f ON s.file_id = f.id
             WHERE s.id = ?1",
            params![symbol_id],
            |row| {
                Ok(SearchHit {
                    symbol_id,
                    name: row.get(0)?,
                    qualified_name: row.get(1)?,
                    kind: row.get(2)?,
                    path: row.get(3)?,
                    line: row.get::<_, i64>(4)? as u32,
                    score,
                })
            },
        )?;
        hits.push(hit);
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_camel_and_snake() {
        let tokens = tokenize("OpenDatabase open_database");
        assert_eq!(tokens, vec!["open", "database", "open", "database"]);
    }

    #[test]
    fn test_tokenize_strips_stopwords() {
        let tokens = tokenize("the return value from a function class");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"return".to_string()));
        assert!(!tokens.contains(&"function".to_string()));
        assert!(!tokens.contains(&"class".to_string()));
        assert!(tokens.contains(&"value".to_string()));
    }

    #[test]
    fn test_suffix_folding() {
        assert_eq!(fold_suffix("connections"), "connection");
        assert_eq!(fold_suffix("opening"), "open");
        assert_eq!(fold_suffix("parsed"), "pars");
        // Stem would be shorter than 3: left alone.
        assert_eq!(fold_suffix("bed"), "bed");
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let mut v = HashMap::new();
        v.insert("database".to_string(), 0.5);
        v.insert("connection".to_string(), 0.3);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let mut a = HashMap::new();
        a.insert("database".to_string(), 1.0);
        let mut b = HashMap::new();
        b.insert("login".to_string(), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_empty_is_zero() {
        let empty = HashMap::new();
        let mut v = HashMap::new();
        v.insert("a".to_string(), 1.0);
        assert_eq!(cosine_similarity(&empty, &v), 0.0);
        assert_eq!(cosine_similarity(&empty, &empty), 0.0);
    }

    #[test]
    fn test_idf_is_smoothed() {
        // A term in every document still gets positive weight.
        assert!(idf(10, 10) > 0.9);
        assert!(idf(0, 10) > idf(5, 10));
    }
}
