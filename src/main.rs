//! CLI entry point for stockpile.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use stockpile_core::{CancelFlag, Config, EventSink, RunOptions, RunOutcome, blacklist, run_all};
use tracing::{debug, error, info, warn};

mod cli;
mod progress;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            error!(error = %e, "stockpile failed");
            eprintln!("error: {e:#}");
            ExitCode::from(RunOutcome::Failure.exit_code())
        }
    }
}

// Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> Result<RunOutcome> {
    let config = Config::load(&args.config)
        .with_context(|| format!("cannot load configuration {}", args.config.display()))?;

    match args.command {
        Command::Run { staging, channels } => {
            let options = RunOptions { staging, channels };
            run_channels(&config, &options, args.quiet).await
        }
        Command::Blacklist {
            channel,
            artifact,
            version,
        } => {
            blacklist(&config, &channel, &artifact, &version)
                .await
                .with_context(|| format!("cannot blacklist {artifact}@{version}"))?;
            Ok(RunOutcome::Success)
        }
    }
}

async fn run_channels(config: &Config, options: &RunOptions, quiet: bool) -> Result<RunOutcome> {
    info!("Stockpile starting");

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight work");
            on_signal.cancel();
        }
    });

    let (events, rx) = EventSink::channel();
    let use_spinner = !quiet && io::stderr().is_terminal();
    let observer = progress::spawn_progress_ui(use_spinner, rx);

    let results = run_all(config, options, events, cancel).await;
    // run_all dropped its sink clones; the observer drains and stops.
    if let Err(e) = observer.await {
        warn!(error = %e, "progress task failed");
    }
    let results = results?;

    for report in results.iter().flatten() {
        info!(
            channel = %report.channel,
            inspected = report.walk.metrics.inspected,
            versions_registered = report.walk.metrics.versions_registered,
            walk_failed = report.walk.failed.len(),
            packages = report.downloads.packages,
            versions = report.downloads.versions,
            downloaded = report.downloads.downloaded,
            skipped = report.downloads.skipped,
            filtered = report.downloads.filtered,
            failed = report.downloads.failed,
            cancelled = report.walk.cancelled,
            "channel finished"
        );
    }

    let outcome = RunOutcome::from_results(&results);
    match outcome {
        RunOutcome::Success => info!("run complete"),
        RunOutcome::Partial => warn!("run complete with failures"),
        RunOutcome::Failure => error!("one or more channels failed"),
    }
    Ok(outcome)
}
