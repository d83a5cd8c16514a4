//! roam CLI entry point.
//!
//! Thin dispatch over the analysis library: parse arguments, open the
//! engine, run the requested analysis, render the envelope.

mod cli;
mod render;

use std::process::ExitCode;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use roam::analysis::{
    affected, breaking, complexity, context, coupling, dead, deps, envelope_or_raise, file_info,
    health, impact, map, risk, search, trace, understand,
};
use roam::{fitness, CancelToken, Engine, Envelope, RoamError};

use cli::{parse_args, print_usage, Cli, Command};

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") || args.is_empty() {
        print_usage();
        return if args.is_empty() {
            ExitCode::from(2)
        } else {
            ExitCode::SUCCESS
        };
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!("Run `roam --help` for usage.");
            return ExitCode::from(2);
        }
    };

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging() {
    let level = std::env::var("ROAM_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, RoamError> {
    let root = roam::find_project_root();
    let cancel = CancelToken::new();

    // Commands that work without an open engine.
    match &cli.command {
        Command::Init => {
            std::fs::create_dir_all(root.join(roam::config::ROAM_DIR))?;
            let summary = Engine::index(&root, &roam::ExtractorSet::builtin(), None)?;
            emit(cli, &index_envelope("init", &summary));
            return Ok(ExitCode::SUCCESS);
        }
        Command::Index => {
            let progress = indicatif::ProgressBar::new(0);
            progress.set_style(
                indicatif::ProgressStyle::with_template("{pos}/{len} files {bar:30}")
                    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar()),
            );
            let report = {
                let bar = progress.clone();
                move |done: usize, total: usize| {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                }
            };
            let summary = Engine::index(&root, &roam::ExtractorSet::builtin(), Some(&report))?;
            progress.finish_and_clear();
            emit(cli, &index_envelope("index", &summary));
            return Ok(ExitCode::SUCCESS);
        }
        Command::Fitness { init: true, .. } => {
            match fitness::init_config(&root)? {
                Some(path) => println!("Created {}", path.display()),
                None => println!("Config already exists"),
            }
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let engine = Engine::open(&root)?;

    let envelope = match &cli.command {
        Command::Understand => understand::run(&engine, &cancel),
        Command::Health => health::run(&engine, &cancel),
        Command::Map { budget } => map::run(&engine, *budget, &cancel),
        Command::Dead => dead::run(&engine, &cancel),
        Command::Complexity { threshold } => complexity::run(&engine, *threshold, &cancel),
        Command::Coupling => coupling::run(&engine, &cancel),
        Command::Impact { symbol } => impact::run(&engine, symbol, &cancel),
        Command::Trace { source, target } => trace::run(&engine, source, target, &cancel),
        Command::Deps { path } => deps::run(&engine, path, &cancel),
        Command::File { path } => file_info::run(&engine, path, &cancel),
        Command::Search { query } => search::substring(&engine, query, &cancel),
        Command::SearchSemantic {
            query,
            top,
            threshold,
        } => search::semantic(&engine, query, *top, *threshold, &cancel),
        Command::Context { symbol, task } => {
            context::run(&engine, symbol, task.as_deref(), &cancel)
        }
        Command::AffectedTests { staged, target } => {
            affected::run(&engine, target.as_deref(), *staged, &cancel)
        }
        Command::PrRisk { staged } => risk::pr_risk(&engine, *staged, &cancel),
        Command::Preflight { staged, target } => {
            risk::preflight(&engine, target.as_deref(), *staged, &cancel)
        }
        Command::Breaking { refspec } => breaking::run(&engine, refspec, &cancel),
        Command::Fitness { rule, explain, .. } => {
            return run_fitness(cli, &engine, rule.as_deref(), *explain, &cancel);
        }
        Command::Init | Command::Index => unreachable!("handled above"),
    };

    let envelope = match envelope {
        Ok(envelope) => envelope,
        Err(e) => envelope_or_raise(command_name(&cli.command), e)?,
    };
    emit(cli, &envelope);
    Ok(ExitCode::SUCCESS)
}

fn run_fitness(
    cli: &Cli,
    engine: &Engine,
    rule_filter: Option<&str>,
    explain: bool,
    cancel: &CancelToken,
) -> Result<ExitCode, RoamError> {
    let mut rules = fitness::load_rules(engine.root())?;
    if rules.is_empty() {
        println!("No fitness rules found. Create .roam/fitness.yaml or run:");
        println!("  roam fitness --init");
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(filter) = rule_filter {
        let needle = filter.to_lowercase();
        rules.retain(|r| r.name.to_lowercase().contains(&needle));
        if rules.is_empty() {
            println!("No rules matching '{filter}'.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = fitness::evaluate(engine, &rules, cancel)?;
    if cli.json {
        println!("{}", fitness::report_envelope(&report).to_json());
    } else {
        render_fitness(&report, &rules, explain);
    }

    if report.failed() > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn render_fitness(report: &fitness::FitnessReport, rules: &[fitness::Rule], explain: bool) {
    println!("Fitness check: {} rules\n", report.rules.len());
    for result in &report.rules {
        let detail = if result.violations > 0 {
            format!(" ({} violations)", result.violations)
        } else {
            String::new()
        };
        let mut line = format!("  [{}] {}{detail}", result.status, result.name);
        if result.status == "FAIL" {
            if let Some(reason) = &result.reason {
                line.push_str(&format!(" -- Reason: {reason}"));
            }
            if let Some(link) = &result.link {
                line.push_str(&format!(" (see: {link})"));
            }
        }
        println!("{line}");
        if explain {
            if let Some(rule) = rules.iter().find(|r| r.name == result.name) {
                if let Some(reason) = &rule.reason {
                    println!("    Reason: {reason}");
                }
                if let Some(link) = &rule.link {
                    println!("    Link:   {link}");
                }
            }
        }
    }

    if !report.violations.is_empty() {
        println!("\nViolations ({}):\n", report.violations.len());
        for violation in report.violations.iter().take(30) {
            println!("  {}: {}", violation.rule, violation.message);
            if let Some(source) = &violation.source {
                println!("    at {source}");
            }
        }
        if report.violations.len() > 30 {
            println!("\n  ... and {} more", report.violations.len() - 30);
        }
    }
    println!("\n{} passed, {} failed", report.passed(), report.failed());
}

fn index_envelope(command: &str, summary: &roam::IndexSummary) -> Envelope {
    let verdict = if summary.warnings.is_empty() {
        "indexed"
    } else {
        "indexed-with-warnings"
    };
    Envelope::new(command, verdict)
        .summary_field("files_scanned", json!(summary.files_scanned))
        .summary_field("files_changed", json!(summary.files_changed))
        .summary_field("files_removed", json!(summary.files_removed))
        .summary_field("duration_ms", json!(summary.duration_ms))
        .payload_field("symbols_added", json!(summary.symbols_added))
        .payload_field("symbols_removed", json!(summary.symbols_removed))
        .payload_field("edges_added", json!(summary.edges_added))
        .payload_field("edges_removed", json!(summary.edges_removed))
        .payload_field("edges_unresolved", json!(summary.edges_unresolved))
        .payload_field("warnings", json!(summary.warnings))
}

fn emit(cli: &Cli, envelope: &Envelope) {
    if cli.json {
        println!("{}", envelope.to_json());
    } else {
        print!("{}", render::render(envelope));
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Init => "init",
        Command::Index => "index",
        Command::Understand => "understand",
        Command::Health => "health",
        Command::Map { .. } => "map",
        Command::Dead => "dead",
        Command::Complexity { .. } => "complexity",
        Command::Coupling => "coupling",
        Command::Impact { .. } => "impact",
        Command::Trace { .. } => "trace",
        Command::Deps { .. } => "deps",
        Command::File { .. } => "file",
        Command::Search { .. } => "search",
        Command::SearchSemantic { .. } => "search-semantic",
        Command::Context { .. } => "context",
        Command::AffectedTests { .. } => "affected-tests",
        Command::PrRisk { .. } => "pr-risk",
        Command::Preflight { .. } => "preflight",
        Command::Breaking { .. } => "breaking",
        Command::Fitness { .. } => "fitness",
    }
}
