//! TF-IDF semantic search over a small multi-domain corpus.

mod common;

use common::{open_engine, scratch_project};
use roam::analysis::search;
use roam::CancelToken;

fn semantic_project() -> tempfile::TempDir {
    scratch_project(&[
        (
            "db/connection.py",
            "def open_database():\n    '''Open a database connection.'''\n    pass\n\
             def close_database():\n    '''Close the database connection.'''\n    pass\n",
        ),
        (
            "db/pool.py",
            "class ConnectionPool:\n    '''Pool of database connections.'''\n\
             \x20\x20\x20\x20def get_connection(self):\n        pass\n\
             \x20\x20\x20\x20def release_connection(self, conn):\n        pass\n",
        ),
        (
            "auth/login.py",
            "def authenticate_user(username, password):\n    '''Authenticate a user with credentials.'''\n    pass\n\
             def logout_user(session):\n    '''Log out the current user.'''\n    pass\n",
        ),
        (
            "api/routes.py",
            "def handle_request(req):\n    '''Handle incoming HTTP request.'''\n    pass\n\
             def send_response(data):\n    '''Send HTTP response.'''\n    pass\n",
        ),
    ])
}

#[test]
fn test_database_query_prefers_db_symbols() {
    let dir = semantic_project();
    let engine = open_engine(&dir);

    let envelope =
        search::semantic(&engine, "database connection", 4, 0.0, &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "matches");

    let results = envelope.payload["results"].as_array().unwrap();
    assert!(!results.is_empty());
    let db_hits = results
        .iter()
        .filter(|r| r["path"].as_str().unwrap().starts_with("db/"))
        .count();
    assert!(db_hits >= 3, "expected db/ symbols to dominate: {results:?}");
}

#[test]
fn test_scores_descend() {
    let dir = semantic_project();
    let engine = open_engine(&dir);

    let envelope =
        search::semantic(&engine, "database connection", 10, 0.0, &CancelToken::new()).unwrap();
    let results = envelope.payload["results"].as_array().unwrap();
    let scores: Vec<f64> = results
        .iter()
        .map(|r| r["score"].as_f64().unwrap())
        .collect();
    for window in scores.windows(2) {
        assert!(window[0] >= window[1], "{scores:?}");
    }
}

#[test]
fn test_top_k_limits_results() {
    let dir = semantic_project();
    let engine = open_engine(&dir);
    let envelope =
        search::semantic(&engine, "database", 2, 0.0, &CancelToken::new()).unwrap();
    assert!(envelope.payload["results"].as_array().unwrap().len() <= 2);
}

#[test]
fn test_high_threshold_yields_no_matches() {
    let dir = semantic_project();
    let engine = open_engine(&dir);
    let envelope =
        search::semantic(&engine, "database connection", 10, 0.99, &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "no-matches");
    assert!(envelope.payload["results"].as_array().unwrap().is_empty());
}

#[test]
fn test_unrelated_query_finds_nothing() {
    let dir = semantic_project();
    let engine = open_engine(&dir);
    let envelope = search::semantic(
        &engine,
        "quantum chromodynamics lattice",
        10,
        0.0,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(envelope.summary.verdict, "no-matches");
}

#[test]
fn test_substring_search() {
    let dir = semantic_project();
    let engine = open_engine(&dir);
    let envelope = search::substring(&engine, "connection", &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "found");
    let results = envelope.payload["results"].as_array().unwrap();
    assert!(results.iter().any(|r| r["name"] == "get_connection"));

    let envelope = search::substring(&engine, "zzz_nothing", &CancelToken::new()).unwrap();
    assert_eq!(envelope.summary.verdict, "not-found");
}
