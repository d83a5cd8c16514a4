//! Architectural fitness functions.
//!
//! Declarative rules from `.roam/fitness.yaml`, checked against the
//! index: dependency constraints, metric thresholds, and naming
//! conventions. Any violation makes the `fitness` command exit 1 so
//! the check slots into CI.

use std::collections::BTreeMap;
use std::path::Path;

use globset::Glob;
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::cancel::CancelToken;
use crate::config::{parse_flat_document, ScalarValue, ROAM_DIR};
use crate::engine::Engine;
use crate::envelope::Envelope;
use crate::error::{Result, RoamError};
use crate::graph::algo;
use crate::graph::metrics::{BOTTLENECK_BETWEENNESS, GOD_COMPONENT_DEGREE};

/// Per-symbol metric violations reported per rule.
const PER_SYMBOL_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub enum RuleSpec {
    Dependency {
        from: String,
        to: String,
        allow: bool,
    },
    Metric {
        metric: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Naming {
        kind: String,
        pattern: String,
        exclude: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub reason: Option<String>,
    pub link: Option<String>,
    pub spec: RuleSpec,
}

impl Rule {
    pub fn rule_type(&self) -> &'static str {
        match self.spec {
            RuleSpec::Dependency { .. } => "dependency",
            RuleSpec::Metric { .. } => "metric",
            RuleSpec::Naming { .. } => "naming",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub rule: String,
    pub rule_type: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleResult {
    pub name: String,
    pub rule_type: &'static str,
    pub status: &'static str,
    pub violations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FitnessReport {
    pub rules: Vec<RuleResult>,
    pub violations: Vec<Violation>,
}

impl FitnessReport {
    pub fn passed(&self) -> usize {
        self.rules.iter().filter(|r| r.status == "PASS").count()
    }

    pub fn failed(&self) -> usize {
        self.rules.iter().filter(|r| r.status == "FAIL").count()
    }
}

/// Load rules from `.roam/fitness.{yaml,yml}`. Absence of the file is
/// an empty rule set, not an error.
pub fn load_rules(root: &Path) -> Result<Vec<Rule>> {
    let mut path = root.join(ROAM_DIR).join("fitness.yaml");
    if !path.exists() {
        path = root.join(ROAM_DIR).join("fitness.yml");
    }
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)?;
    parse_rules(&text)
}

fn parse_rules(text: &str) -> Result<Vec<Rule>> {
    let doc = parse_flat_document(text)?;
    let Some(blocks) = doc.blocks.get("rules") else {
        return Ok(Vec::new());
    };
    let mut rules = Vec::new();
    for block in blocks {
        let name = field_str(block, "name").unwrap_or_else(|| "unnamed".to_string());
        let rule_type = field_str(block, "type").unwrap_or_default();
        let spec = match rule_type.as_str() {
            "dependency" => RuleSpec::Dependency {
                from: field_str(block, "from").unwrap_or_else(|| "**".to_string()),
                to: field_str(block, "to").unwrap_or_else(|| "**".to_string()),
                allow: block.get("allow").and_then(ScalarValue::as_bool).unwrap_or(false),
            },
            "metric" => RuleSpec::Metric {
                metric: field_str(block, "metric").unwrap_or_default(),
                min: block.get("min").and_then(ScalarValue::as_f64),
                max: block.get("max").and_then(ScalarValue::as_f64),
            },
            "naming" => RuleSpec::Naming {
                kind: field_str(block, "kind").unwrap_or_else(|| "function".to_string()),
                pattern: field_str(block, "pattern").unwrap_or_default(),
                exclude: field_str(block, "exclude"),
            },
            other => {
                return Err(RoamError::Config(format!(
                    "rule '{name}': unknown type '{other}'"
                )))
            }
        };
        rules.push(Rule {
            name,
            reason: field_str(block, "reason"),
            link: field_str(block, "link"),
            spec,
        });
    }
    Ok(rules)
}

fn field_str(block: &BTreeMap<String, ScalarValue>, key: &str) -> Option<String> {
    match block.get(key) {
        Some(ScalarValue::Str(s)) if !s.is_empty() => Some(s.clone()),
        Some(ScalarValue::Int(n)) => Some(n.to_string()),
        Some(ScalarValue::Float(f)) => Some(f.to_string()),
        Some(ScalarValue::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// Evaluate all rules against the index. Dependency rules run first so
/// the `layer_violations` metric can observe their count.
pub fn evaluate(engine: &Engine, rules: &[Rule], cancel: &CancelToken) -> Result<FitnessReport> {
    let mut report = FitnessReport {
        rules: Vec::new(),
        violations: Vec::new(),
    };

    let mut layer_violations = 0usize;
    let mut deferred: Vec<&Rule> = Vec::new();

    for rule in rules {
        cancel.check()?;
        match &rule.spec {
            RuleSpec::Dependency { from, to, allow } => {
                let violations = check_dependency(engine, rule, from, to, *allow)?;
                layer_violations += violations.len();
                record(&mut report, rule, violations);
            }
            _ => deferred.push(rule),
        }
    }

    for rule in deferred {
        cancel.check()?;
        let violations = match &rule.spec {
            RuleSpec::Metric { metric, min, max } => {
                check_metric(engine, rule, metric, *min, *max, layer_violations, cancel)?
            }
            RuleSpec::Naming {
                kind,
                pattern,
                exclude,
            } => check_naming(engine, rule, kind, pattern, exclude.as_deref())?,
            RuleSpec::Dependency { .. } => unreachable!("dependency rules handled above"),
        };
        record(&mut report, rule, violations);
    }

    Ok(report)
}

fn record(report: &mut FitnessReport, rule: &Rule, violations: Vec<Violation>) {
    report.rules.push(RuleResult {
        name: rule.name.clone(),
        rule_type: rule.rule_type(),
        status: if violations.is_empty() { "PASS" } else { "FAIL" },
        violations: violations.len(),
        reason: rule.reason.clone(),
        link: rule.link.clone(),
    });
    report.violations.extend(violations);
}

fn check_dependency(
    engine: &Engine,
    rule: &Rule,
    from: &str,
    to: &str,
    allow: bool,
) -> Result<Vec<Violation>> {
    let from_glob = compile_glob(&rule.name, from)?;
    let to_glob = compile_glob(&rule.name, to)?;

    let mut stmt = engine.conn().prepare(
        "SELECT sf.path, tf.path, ss.name, ts.name, e.kind, e.line
         FROM edges e
         JOIN symbols ss ON e.source_id = ss.id
         JOIN symbols ts ON e.target_id = ts.id
         JOIN files sf ON ss.file_id = sf.id
         JOIN files tf ON ts.file_id = tf.id
         ORDER BY sf.path, e.line",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<i64>>(5)?,
        ))
    })?;

    let mut violations = Vec::new();
    for row in rows {
        let (source_path, target_path, source_name, target_name, kind, line) = row?;
        let source_match = from_glob.is_match(&source_path);
        let violating = if allow {
            // Whitelist: sources under `from` may only point inside
            // `to` or their own layer.
            source_match
                && !to_glob.is_match(&target_path)
                && !from_glob.is_match(&target_path)
        } else {
            source_match && to_glob.is_match(&target_path)
        };
        if violating {
            violations.push(Violation {
                rule: rule.name.clone(),
                rule_type: "dependency",
                message: format!("{source_name} -> {target_name} ({kind})"),
                source: Some(format!(
                    "{source_path}:{}",
                    line.map(|l| l.to_string()).unwrap_or_else(|| "?".to_string())
                )),
                value: None,
                threshold: None,
            });
        }
    }
    Ok(violations)
}

fn compile_glob(rule: &str, pattern: &str) -> Result<globset::GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| RoamError::Config(format!("rule '{rule}': bad glob '{pattern}': {e}")))
}

fn check_metric(
    engine: &Engine,
    rule: &Rule,
    metric: &str,
    min: Option<f64>,
    max: Option<f64>,
    layer_violations: usize,
    cancel: &CancelToken,
) -> Result<Vec<Violation>> {
    if metric == "cognitive_complexity" {
        return check_complexity_metric(engine, rule, max);
    }

    let value = match metric {
        "cycles" => {
            let graph = engine.symbol_graph()?;
            algo::find_cycles(&graph, cancel)?.len() as f64
        }
        "health_score" => compute_health(engine, cancel)? as f64,
        "god_components" => {
            let graph = engine.symbol_graph()?;
            let (rows, _) = engine.graph_metrics(&graph, cancel)?;
            rows.values()
                .filter(|r| r.in_degree + r.out_degree > GOD_COMPONENT_DEGREE)
                .count() as f64
        }
        "bottlenecks" => {
            let graph = engine.symbol_graph()?;
            let (rows, _) = engine.graph_metrics(&graph, cancel)?;
            rows.values()
                .filter(|r| r.betweenness > BOTTLENECK_BETWEENNESS)
                .count() as f64
        }
        "dead_exports" => {
            let graph = engine.symbol_graph()?;
            let entry_points = crate::analysis::entry_point_matcher(engine.config())?;
            let tests = crate::analysis::test_matcher(engine.config())?;
            crate::analysis::dead::dead_export_indices(&graph, &entry_points, &tests).len() as f64
        }
        "layer_violations" => layer_violations as f64,
        other => {
            return Err(RoamError::Config(format!(
                "rule '{}': unknown metric '{other}'",
                rule.name
            )))
        }
    };

    let mut violations = Vec::new();
    if let Some(max) = max {
        if value > max {
            violations.push(threshold_violation(rule, metric, value, max, "max"));
        }
    }
    if let Some(min) = min {
        if value < min {
            violations.push(threshold_violation(rule, metric, value, min, "min"));
        }
    }
    Ok(violations)
}

fn threshold_violation(
    rule: &Rule,
    metric: &str,
    value: f64,
    threshold: f64,
    bound: &str,
) -> Violation {
    Violation {
        rule: rule.name.clone(),
        rule_type: "metric",
        message: format!("{metric}={value:.0} ({bound}={threshold:.0})"),
        source: None,
        value: Some(value),
        threshold: Some(threshold),
    }
}

/// Per-symbol check: every symbol above `max` is its own violation,
/// capped at the first 50 offenders.
fn check_complexity_metric(
    engine: &Engine,
    rule: &Rule,
    max: Option<f64>,
) -> Result<Vec<Violation>> {
    let threshold = max.unwrap_or(f64::MAX);
    let mut stmt = engine.conn().prepare(
        "SELECT s.name, f.path, s.line_start, m.cognitive_complexity
         FROM symbol_metrics m
         JOIN symbols s ON m.symbol_id = s.id
         JOIN files f ON s.file_id = f.id
         WHERE m.cognitive_complexity > ?1
         ORDER BY m.cognitive_complexity DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![threshold, PER_SYMBOL_LIMIT as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;
    let mut violations = Vec::new();
    for row in rows {
        let (name, path, line, complexity) = row?;
        violations.push(Violation {
            rule: rule.name.clone(),
            rule_type: "metric",
            message: format!("{name} complexity={complexity:.0} (max={threshold:.0})"),
            source: Some(format!("{path}:{line}")),
            value: Some(complexity),
            threshold: Some(threshold),
        });
    }
    Ok(violations)
}

/// Health score per the unified scoring model: reuse the health
/// analysis so the fitness gate and `roam health` always agree.
fn compute_health(engine: &Engine, cancel: &CancelToken) -> Result<u32> {
    let envelope = crate::analysis::health::run(engine, cancel)?;
    Ok(envelope
        .summary
        .fields
        .get("score")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0) as u32)
}

fn check_naming(
    engine: &Engine,
    rule: &Rule,
    kind: &str,
    pattern: &str,
    exclude: Option<&str>,
) -> Result<Vec<Violation>> {
    if pattern.is_empty() {
        return Ok(Vec::new());
    }
    let regex = Regex::new(pattern)
        .map_err(|e| RoamError::Config(format!("rule '{}': bad pattern: {e}", rule.name)))?;
    let exclude = exclude
        .map(Regex::new)
        .transpose()
        .map_err(|e| RoamError::Config(format!("rule '{}': bad exclude: {e}", rule.name)))?;

    let mut stmt = engine.conn().prepare(
        "SELECT s.name, f.path, s.line_start FROM symbols s
         JOIN files f ON s.file_id = f.id
         WHERE s.kind = ?1 ORDER BY f.path, s.line_start",
    )?;
    let rows = stmt.query_map([kind], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut violations = Vec::new();
    for row in rows {
        let (name, path, line) = row?;
        if exclude.as_ref().is_some_and(|re| re.is_match(&name)) {
            continue;
        }
        if !regex.is_match(&name) {
            violations.push(Violation {
                rule: rule.name.clone(),
                rule_type: "naming",
                message: format!("{name} does not match {pattern}"),
                source: Some(format!("{path}:{line}")),
                value: None,
                threshold: None,
            });
        }
    }
    Ok(violations)
}

/// Build the fitness envelope for a report.
pub fn report_envelope(report: &FitnessReport) -> Envelope {
    let verdict = if report.failed() == 0 { "pass" } else { "fail" };
    Envelope::new("fitness", verdict)
        .summary_field("rules_checked", json!(report.rules.len()))
        .summary_field("passed", json!(report.passed()))
        .summary_field("failed", json!(report.failed()))
        .summary_field("total_violations", json!(report.violations.len()))
        .payload_field("rules", json!(report.rules))
        .payload_field(
            "violations",
            json!(report.violations.iter().take(100).collect::<Vec<_>>()),
        )
}

/// Starter configuration written by `fitness --init`.
pub const STARTER_CONFIG: &str = "\
# Architectural fitness functions for roam
# Run with: roam fitness
# Use in CI: roam fitness && echo \"Architecture OK\"
# Each rule may include optional 'reason' and 'link' fields.

rules:
  # Dependency constraints
  # - name: \"No direct DB access from handlers\"
  #   type: dependency
  #   from: \"src/handlers/**\"
  #   to: \"src/db/**\"
  #   allow: false
  #   reason: \"Handlers should use the service layer\"

  - name: \"No cycles\"
    type: metric
    metric: cycles
    max: 0
    reason: \"Dependency cycles make the codebase harder to reason about\"

  - name: \"Health score above 60\"
    type: metric
    metric: health_score
    min: 60

  - name: \"Max function complexity 25\"
    type: metric
    metric: cognitive_complexity
    max: 25
    reason: \"Functions above this threshold should be split\"

  # Naming conventions
  # - name: \"Functions use snake_case\"
  #   type: naming
  #   kind: function
  #   pattern: \"^[a-z_][a-z0-9_]*$\"
  #   exclude: \"test_.*\"
";

/// Create `.roam/fitness.yaml` when absent. Returns the path written,
/// or `None` when a config already exists.
pub fn init_config(root: &Path) -> Result<Option<std::path::PathBuf>> {
    let dir = root.join(ROAM_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("fitness.yaml");
    if path.exists() {
        return Ok(None);
    }
    std::fs::write(&path, STARTER_CONFIG)?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules_all_types() {
        let rules = parse_rules(
            "rules:\n\
             - name: layering\n\
             \x20\x20type: dependency\n\
             \x20\x20from: handlers/**\n\
             \x20\x20to: db/**\n\
             \x20\x20allow: false\n\
             - name: no-cycles\n\
             \x20\x20type: metric\n\
             \x20\x20metric: cycles\n\
             \x20\x20max: 0\n\
             - name: snake\n\
             \x20\x20type: naming\n\
             \x20\x20kind: function\n\
             \x20\x20pattern: \"^[a-z_][a-z0-9_]*$\"\n\
             \x20\x20exclude: \"test_.*\"\n",
        )
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert!(matches!(rules[0].spec, RuleSpec::Dependency { allow: false, .. }));
        assert!(matches!(rules[1].spec, RuleSpec::Metric { .. }));
        assert!(matches!(rules[2].spec, RuleSpec::Naming { .. }));
    }

    #[test]
    fn test_parse_rules_rejects_unknown_type() {
        let err = parse_rules("rules:\n- name: x\n\x20\x20type: banana\n").unwrap_err();
        assert!(err.to_string().contains("unknown type"));
    }

    #[test]
    fn test_starter_config_parses() {
        let rules = parse_rules(STARTER_CONFIG).unwrap();
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().any(|r| r.name == "No cycles"));
    }

    #[test]
    fn test_empty_document_means_no_rules() {
        assert!(parse_rules("# nothing here\n").unwrap().is_empty());
    }
}
