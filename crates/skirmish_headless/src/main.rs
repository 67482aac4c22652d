//! Headless skirmish runner.
//!
//! # Usage
//!
//! ```bash
//! # Run one scenario and print a JSON report
//! cargo run -p skirmish_headless -- run --scenario crates/skirmish_headless/scenarios/duel.ron
//!
//! # Run several scenarios in parallel, one JSON line each
//! cargo run -p skirmish_headless -- batch --scenario a.ron --scenario b.ron --ticks 600
//!
//! # Validate a scenario without running it
//! cargo run -p skirmish_headless -- check --scenario a.ron
//! ```
//!
//! Reports go to stdout, logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_headless::{run_batch, run_file, Scenario};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish simulation runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the number of ticks
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Run several scenarios in parallel
    Batch {
        /// Scenario files to load
        #[arg(short, long, required = true, num_args = 1..)]
        scenario: Vec<PathBuf>,

        /// Override the number of ticks
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Validate a scenario without running it
    Check {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            pretty,
        } => run_single(scenario, ticks, pretty),
        Commands::Batch { scenario, ticks } => run_many(&scenario, ticks),
        Commands::Check { scenario } => check(scenario),
    }
}

fn run_single(path: PathBuf, ticks: Option<u64>, pretty: bool) -> ExitCode {
    let report = match run_file(&path, ticks) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("FATAL: {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let json = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    match json {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("FATAL: Failed to serialize report: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_many(paths: &[PathBuf], ticks: Option<u64>) -> ExitCode {
    let mut failed = 0usize;
    for entry in run_batch(paths, ticks) {
        let line = match &entry.result {
            Ok(report) => serde_json::to_string(report),
            Err(e) => {
                failed += 1;
                serde_json::to_string(&serde_json::json!({
                    "path": entry.path.display().to_string(),
                    "error": e.to_string(),
                }))
            }
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("FATAL: Failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} scenarios failed", paths.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check(path: PathBuf) -> ExitCode {
    let result = Scenario::load(&path)
        .and_then(|scenario| scenario.prepare().map(|prepared| (scenario, prepared)));
    match result {
        Ok((scenario, prepared)) => {
            eprintln!(
                "OK: '{}' places {} agents with {} orders",
                scenario.name,
                prepared.sim.agents().iter().count(),
                prepared.orders.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("INVALID: {}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}
