//! Cognitive complexity through the full pipeline.

mod common;

use common::{open_engine, scratch_project};
use roam::analysis::complexity;
use roam::CancelToken;

const NESTED: &str = "\
def deep(x):
    if x > 0:
        if x > 1:
            if x > 2:
                if x > 3:
                    if x > 4:
                        return x
    return 0
";

#[test]
fn test_nested_ifs_cross_threshold_fifteen() {
    let dir = scratch_project(&[("deep.py", NESTED)]);
    let engine = open_engine(&dir);

    let envelope = complexity::run(&engine, 15.0, &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "complex");
    let symbols = envelope.payload["symbols"].as_array().unwrap();
    assert_eq!(symbols.len(), 1, "{symbols:?}");
    assert_eq!(symbols[0]["name"], "deep");
    assert!(symbols[0]["complexity"].as_f64().unwrap() >= 15.0);
    assert_eq!(symbols[0]["nesting_depth"], 5);
}

#[test]
fn test_threshold_filters_simple_functions() {
    let dir = scratch_project(&[(
        "app.py",
        "def simple(a, b):\n    return a + b\n\ndef branchy(x):\n    if x:\n        return 1\n    return 2\n",
    )]);
    let engine = open_engine(&dir);

    let envelope = complexity::run(&engine, 15.0, &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "clean");

    let envelope = complexity::run(&engine, 1.0, &CancelToken::new()).unwrap();
    let symbols = envelope.payload["symbols"].as_array().unwrap();
    assert!(symbols.iter().any(|s| s["name"] == "branchy"));
    assert!(!symbols.iter().any(|s| s["name"] == "simple"));
}

#[test]
fn test_results_sorted_descending() {
    let dir = scratch_project(&[
        ("deep.py", NESTED),
        (
            "shallow.py",
            "def one_if(x):\n    if x:\n        return 1\n    return 0\n",
        ),
    ]);
    let engine = open_engine(&dir);

    let envelope = complexity::run(&engine, 1.0, &CancelToken::new()).unwrap();
    let symbols = envelope.payload["symbols"].as_array().unwrap();
    let scores: Vec<f64> = symbols
        .iter()
        .map(|s| s["complexity"].as_f64().unwrap())
        .collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(scores, sorted);
    assert_eq!(symbols[0]["name"], "deep");
}
