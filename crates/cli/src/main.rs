// crates/cli/src/main.rs
//! opwatch: follow long-running server operations from the terminal.

mod render;
mod watch;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use opwatch_client::{ClientConfig, HttpApi, OperationApi, Tracker};
use opwatch_core::reconcile::derive_from_steps;
use opwatch_observability::{init_tracing, LogFormat};
use opwatch_types::{LifecycleStatus, LogQuery, OperationId, Severity};

#[derive(Parser, Debug)]
#[command(name = "opwatch")]
#[command(version, about = "Follow long-running server operations live", long_about = None)]
struct Cli {
    /// Server base URL (overrides OPWATCH_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show live progress until every operation finishes
    Watch {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Print one JSON snapshot per line instead of progress bars
        #[arg(long)]
        json: bool,
    },
    /// Ask the server to cancel an operation
    Cancel { id: String },
    /// Print the persisted event log
    Events {
        id: String,
        /// Only entries of this severity (debug, info, warning, error)
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Print the recorded step history
    Steps {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| format!("unknown severity {s:?}"))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "warn,opwatch_core=debug,opwatch_client=debug,opwatch_cli=debug"
    } else {
        "warn"
    };
    init_tracing(directive, LogFormat::from_env())?;

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    let api = Arc::new(HttpApi::new(config.clone())?);

    match cli.command {
        Command::Watch { ids, json } => {
            let ids: Vec<OperationId> = ids.into_iter().map(OperationId::from).collect();
            let handle = Tracker::spawn(api, config);
            let outcome = watch::run(&handle, ids, json).await;
            handle.shutdown().await?;
            let outcome = outcome?;

            if outcome.interrupted {
                bail!("interrupted");
            }
            let failed: Vec<&str> = outcome
                .finished
                .values()
                .filter(|s| s.lifecycle != LifecycleStatus::Completed)
                .map(|s| s.operation_id.as_str())
                .collect();
            if !failed.is_empty() {
                bail!("{} did not complete: {}", failed.len(), failed.join(", "));
            }
        }
        Command::Cancel { id } => {
            let handle = Tracker::spawn(api, config);
            let result = handle.cancel(id.as_str()).await;
            handle.shutdown().await?;
            result?;
            println!("Cancel requested for {id}");
        }
        Command::Events {
            id,
            severity,
            limit,
            offset,
            json,
        } => {
            let query = LogQuery {
                limit,
                offset,
                severity,
            };
            let events = api.event_log(&OperationId::from(id), query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events.");
            } else {
                for event in &events {
                    println!("{}", render::format_event(event));
                }
            }
        }
        Command::Steps { id, json } => {
            let steps = api.step_history(&OperationId::from(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
                return Ok(());
            }
            for step in &steps {
                println!("{}", render::format_step(step));
            }
            match derive_from_steps(&steps) {
                Some(progress) => println!(
                    "{} · {}% · {}",
                    progress.lifecycle_status.as_str(),
                    progress.progress_percent,
                    render::format_elapsed(progress.elapsed_seconds)
                ),
                None => println!("No steps recorded."),
            }
        }
    }
    Ok(())
}
