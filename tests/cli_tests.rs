//! CLI smoke tests: exit codes and envelope output from the binary.

mod common;

use std::process::{Command, Output};

use common::scratch_project;

fn roam(dir: &tempfile::TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_roam"))
        .args(args)
        .current_dir(dir.path())
        .env("ROAM_PROJECT_ROOT", dir.path())
        .env("ROAM_LOG_LEVEL", "error")
        .output()
        .expect("run roam binary")
}

fn layered_project() -> tempfile::TempDir {
    scratch_project(&[
        (
            "handlers/h.py",
            "from db.d import query\n\ndef serve():\n    return query()\n",
        ),
        ("db/d.py", "def query():\n    return 1\n"),
    ])
}

#[test]
fn test_init_builds_index() {
    let dir = layered_project();
    let output = roam(&dir, &["init"]);
    assert!(output.status.success(), "{output:?}");
    assert!(dir.path().join(".roam/index.db").exists());
}

#[test]
fn test_health_json_is_a_valid_envelope() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());

    let output = roam(&dir, &["--json", "health"]);
    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("health output is JSON");
    let (ok, errors) = roam::validate_envelope(&value);
    assert!(ok, "{errors:?}");
    assert_eq!(value["command"], "health");
    assert!(value["summary"]["verdict"].is_string());
}

#[test]
fn test_human_output_leads_with_verdict() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());

    let output = roam(&dir, &["health"]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.starts_with("VERDICT:"), "{text}");
}

#[test]
fn test_fitness_violation_exits_one() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());
    std::fs::write(
        dir.path().join(".roam/fitness.yaml"),
        "rules:\n- name: \"No DB from handlers\"\n  type: dependency\n  from: \"handlers/**\"\n  to: \"db/**\"\n  allow: false\n",
    )
    .unwrap();

    let output = roam(&dir, &["fitness"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("FAIL"), "{text}");
}

#[test]
fn test_fitness_passes_without_violations() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());
    std::fs::write(
        dir.path().join(".roam/fitness.yaml"),
        "rules:\n- name: \"No handlers from db\"\n  type: dependency\n  from: \"db/**\"\n  to: \"handlers/**\"\n  allow: false\n",
    )
    .unwrap();

    let output = roam(&dir, &["fitness"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
}

#[test]
fn test_fitness_init_writes_starter_config() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());
    let output = roam(&dir, &["fitness", "--init"]);
    assert!(output.status.success());
    assert!(dir.path().join(".roam/fitness.yaml").exists());
}

#[test]
fn test_unknown_command_exits_two() {
    let dir = layered_project();
    let output = roam(&dir, &["frobnicate"]);
    assert_eq!(output.status.code(), Some(2), "{output:?}");
}

#[test]
fn test_missing_flag_value_exits_two() {
    let dir = layered_project();
    let output = roam(&dir, &["complexity", "--threshold"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_corrupt_index_exits_three() {
    let dir = layered_project();
    std::fs::create_dir_all(dir.path().join(".roam")).unwrap();
    std::fs::write(dir.path().join(".roam/index.db"), "not a database").unwrap();

    let output = roam(&dir, &["health"]);
    assert_eq!(output.status.code(), Some(3), "{output:?}");
}

#[test]
fn test_search_semantic_runs_end_to_end() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());

    let output = roam(&dir, &["--json", "search-semantic", "query", "--top", "3"]);
    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["command"], "search-semantic");
}

#[test]
fn test_impact_and_trace_through_cli() {
    let dir = layered_project();
    assert!(roam(&dir, &["init"]).status.success());

    let output = roam(&dir, &["--json", "impact", "query"]);
    assert!(output.status.success(), "{output:?}");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // serve -> query makes query's blast radius at least two symbols.
    assert!(value["summary"]["impacted"].as_u64().unwrap() >= 2);

    let output = roam(&dir, &["--json", "trace", "serve", "query"]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["summary"]["verdict"], "path-found");
}
