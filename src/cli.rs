//! CLI argument parsing.
//!
//! Defines the Command enum and parse_args() for all commands. The
//! global `--json` flag switches output from human text to the JSON
//! envelope.

use roam::analysis::{complexity, map, search};

pub fn print_usage() {
    eprintln!("roam - codebase comprehension engine");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  roam [--json] <command> [arguments]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  init                                Create .roam/ and build the index");
    eprintln!("  index                               Refresh the index incrementally");
    eprintln!("  understand                          One-shot orientation for a new codebase");
    eprintln!("  health                              Aggregate metrics, issues, and a score");
    eprintln!("  map [--budget N]                    Most important symbols per file");
    eprintln!("  dead                                Exported symbols nothing references");
    eprintln!("  complexity [--threshold N]          Cognitive complexity hotspots");
    eprintln!("  coupling                            Strongly coupled and hidden file pairs");
    eprintln!("  impact <symbol>                     Reverse reachability from a change site");
    eprintln!("  trace <source> <target>             Shortest dependency path");
    eprintln!("  deps <path>                         File imports and importers");
    eprintln!("  file <path>                         Symbols and metrics for one file");
    eprintln!("  search <query>                      Substring symbol search");
    eprintln!("  search-semantic <query> [--top K] [--threshold T]");
    eprintln!("                                      TF-IDF search over names and docs");
    eprintln!("  context <symbol> [--task T]         Callers, callees, siblings, tests");
    eprintln!("  affected-tests [--staged] [target]  Tests reachable from a change");
    eprintln!("  pr-risk [--staged]                  Risk rollup for the working set");
    eprintln!("  preflight [--staged] [target]       Pre-change risk assessment");
    eprintln!("  breaking [ref]                      Breaking changes vs a git ref (default HEAD)");
    eprintln!("  fitness [--init|--rule NAME|--explain]");
    eprintln!("                                      Architectural fitness functions");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --json              Emit the JSON envelope instead of text");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ROAM_PROJECT_ROOT   Override project root discovery");
    eprintln!("  ROAM_LOG_LEVEL      Log verbosity (error, warn, info, debug, trace)");
    eprintln!();
    eprintln!("Exit codes: 0 success, 1 fitness violation, 2 usage error, 3 index error");
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    Index,
    Understand,
    Health,
    Map { budget: usize },
    Dead,
    Complexity { threshold: f64 },
    Coupling,
    Impact { symbol: String },
    Trace { source: String, target: String },
    Deps { path: String },
    File { path: String },
    Search { query: String },
    SearchSemantic { query: String, top: usize, threshold: f64 },
    Context { symbol: String, task: Option<String> },
    AffectedTests { staged: bool, target: Option<String> },
    PrRisk { staged: bool },
    Preflight { staged: bool, target: Option<String> },
    Breaking { refspec: String },
    Fitness { init: bool, rule: Option<String>, explain: bool },
}

#[derive(Debug, Clone)]
pub struct Cli {
    pub json: bool,
    pub command: Command,
}

/// Parse argv (without the program name). Usage problems come back as
/// a message for exit code 2.
pub fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut json = false;
    let mut rest: Vec<&str> = Vec::new();
    for arg in args {
        if arg == "--json" {
            json = true;
        } else {
            rest.push(arg.as_str());
        }
    }

    let Some((&name, tail)) = rest.split_first() else {
        return Err("missing command".to_string());
    };

    let command = match name {
        "init" => expect_none(tail, Command::Init)?,
        "index" => expect_none(tail, Command::Index)?,
        "understand" => expect_none(tail, Command::Understand)?,
        "health" => expect_none(tail, Command::Health)?,
        "dead" => expect_none(tail, Command::Dead)?,
        "coupling" => expect_none(tail, Command::Coupling)?,
        "map" => {
            let budget = flag_value(tail, "--budget")?
                .map(|v| parse_count(v, "--budget"))
                .transpose()?
                .unwrap_or(map::DEFAULT_BUDGET);
            Command::Map { budget }
        }
        "complexity" => {
            let threshold = flag_value(tail, "--threshold")?
                .map(|v| parse_number(v, "--threshold"))
                .transpose()?
                .unwrap_or(complexity::DEFAULT_THRESHOLD);
            Command::Complexity { threshold }
        }
        "impact" => Command::Impact {
            symbol: positional(tail, 0, "impact <symbol>")?,
        },
        "trace" => Command::Trace {
            source: positional(tail, 0, "trace <source> <target>")?,
            target: positional(tail, 1, "trace <source> <target>")?,
        },
        "deps" => Command::Deps {
            path: positional(tail, 0, "deps <path>")?,
        },
        "file" => Command::File {
            path: positional(tail, 0, "file <path>")?,
        },
        "search" => Command::Search {
            query: positional(tail, 0, "search <query>")?,
        },
        "search-semantic" => {
            let query = positional(tail, 0, "search-semantic <query>")?;
            let top = flag_value(tail, "--top")?
                .map(|v| parse_count(v, "--top"))
                .transpose()?
                .unwrap_or(search::DEFAULT_TOP_K);
            let threshold = flag_value(tail, "--threshold")?
                .map(|v| parse_number(v, "--threshold"))
                .transpose()?
                .unwrap_or(search::DEFAULT_THRESHOLD);
            Command::SearchSemantic { query, top, threshold }
        }
        "context" => Command::Context {
            symbol: positional(tail, 0, "context <symbol>")?,
            task: flag_value(tail, "--task")?.map(str::to_string),
        },
        "affected-tests" => Command::AffectedTests {
            staged: has_flag(tail, "--staged"),
            target: optional_positional(tail, 0),
        },
        "pr-risk" => Command::PrRisk {
            staged: has_flag(tail, "--staged"),
        },
        "preflight" => Command::Preflight {
            staged: has_flag(tail, "--staged"),
            target: optional_positional(tail, 0),
        },
        "breaking" => Command::Breaking {
            refspec: optional_positional(tail, 0).unwrap_or_else(|| "HEAD".to_string()),
        },
        "fitness" => Command::Fitness {
            init: has_flag(tail, "--init"),
            rule: flag_value(tail, "--rule")?.map(str::to_string),
            explain: has_flag(tail, "--explain"),
        },
        other => return Err(format!("unknown command '{other}'")),
    };

    Ok(Cli { json, command })
}

fn expect_none(tail: &[&str], command: Command) -> Result<Command, String> {
    match tail.first() {
        Some(extra) => Err(format!("unexpected argument '{extra}'")),
        None => Ok(command),
    }
}

fn has_flag(tail: &[&str], flag: &str) -> bool {
    tail.contains(&flag)
}

/// The value following `flag`, if present.
fn flag_value<'a>(tail: &[&'a str], flag: &str) -> Result<Option<&'a str>, String> {
    let Some(pos) = tail.iter().position(|&arg| arg == flag) else {
        return Ok(None);
    };
    match tail.get(pos + 1) {
        Some(&value) if !value.starts_with("--") => Ok(Some(value)),
        _ => Err(format!("{flag} requires a value")),
    }
}

/// The nth non-flag argument.
fn nth_positional(tail: &[&str], n: usize) -> Option<String> {
    let mut skip_next = false;
    let mut seen = 0;
    for (i, &arg) in tail.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            // Flags that take values consume the next argument.
            skip_next = matches!(
                arg,
                "--threshold" | "--top" | "--budget" | "--task" | "--rule"
            ) && tail.get(i + 1).is_some_and(|v| !v.starts_with("--"));
            continue;
        }
        if seen == n {
            return Some(arg.to_string());
        }
        seen += 1;
    }
    None
}

fn positional(tail: &[&str], n: usize, usage: &str) -> Result<String, String> {
    nth_positional(tail, n).ok_or_else(|| format!("usage: roam {usage}"))
}

fn optional_positional(tail: &[&str], n: usize) -> Option<String> {
    nth_positional(tail, n)
}

fn parse_count(value: &str, flag: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("{flag} expects an integer, got '{value}'"))
}

fn parse_number(value: &str, flag: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("{flag} expects a number, got '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_args(&args(&["health"])).unwrap().command, Command::Health);
        assert_eq!(parse_args(&args(&["dead"])).unwrap().command, Command::Dead);
        assert!(parse_args(&args(&["health"])).unwrap().json == false);
    }

    #[test]
    fn test_json_flag_anywhere() {
        let cli = parse_args(&args(&["--json", "health"])).unwrap();
        assert!(cli.json);
        let cli = parse_args(&args(&["health", "--json"])).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_complexity_threshold() {
        let cli = parse_args(&args(&["complexity", "--threshold", "25"])).unwrap();
        assert_eq!(cli.command, Command::Complexity { threshold: 25.0 });
    }

    #[test]
    fn test_trace_requires_two_symbols() {
        assert!(parse_args(&args(&["trace", "a"])).is_err());
        let cli = parse_args(&args(&["trace", "a", "b"])).unwrap();
        assert_eq!(
            cli.command,
            Command::Trace {
                source: "a".to_string(),
                target: "b".to_string()
            }
        );
    }

    #[test]
    fn test_search_semantic_flags() {
        let cli = parse_args(&args(&[
            "search-semantic",
            "database connection",
            "--top",
            "4",
            "--threshold",
            "0.1",
        ]))
        .unwrap();
        assert_eq!(
            cli.command,
            Command::SearchSemantic {
                query: "database connection".to_string(),
                top: 4,
                threshold: 0.1
            }
        );
    }

    #[test]
    fn test_affected_tests_staged_with_target() {
        let cli = parse_args(&args(&["affected-tests", "--staged", "serve"])).unwrap();
        assert_eq!(
            cli.command,
            Command::AffectedTests {
                staged: true,
                target: Some("serve".to_string())
            }
        );
    }

    #[test]
    fn test_breaking_defaults_to_head() {
        let cli = parse_args(&args(&["breaking"])).unwrap();
        assert_eq!(
            cli.command,
            Command::Breaking {
                refspec: "HEAD".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }
}
