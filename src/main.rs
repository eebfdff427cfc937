//! quakeview - Live earthquake dashboard.
//!
//! Polls the USGS GeoJSON feed, filters events by magnitude and recency,
//! and serves a browser map with summary statistics. A one-shot terminal
//! command prints the same derivation.

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod config;
mod dashboard;
mod errors;
mod filters;
mod models;
mod output;
mod prefs;
mod render;
mod scheduler;
mod server;
mod stats;

use cli::{Cli, Command};
use client::{FeedClient, FeedSource};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    match cli.command {
        Command::Serve(args) => runtime.block_on(cmd_serve(args)),
        Command::Snapshot(args) => runtime.block_on(cmd_snapshot(args)),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the `serve` command - run the dashboard until Ctrl-C.
async fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let config = args.config().validate().context("invalid configuration")?;

    // Print startup message
    let url = format!("http://{}:{}", config.host, config.port);
    println!("\x1b[1m🌍 quakeview dashboard\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Feed:    {}", config.feed_url);
    println!("  Refresh: {}s", config.refresh_interval.as_secs());
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    server::run_server(config).await
}

/// Execute the `snapshot` command - one-shot fetch, filter and summary.
async fn cmd_snapshot(args: cli::SnapshotArgs) -> Result<()> {
    let client = FeedClient::new(args.feed.url()).context("failed to create feed client")?;

    let events = client
        .fetch()
        .await
        .with_context(|| format!("failed to fetch {}", client.url()))?;

    let criteria = args.criteria.criteria();
    let derivation = stats::derive(&events, &criteria, chrono::Utc::now().timestamp_millis());
    tracing::debug!(
        "{} of {} events match",
        derivation.events.len(),
        events.len()
    );

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_derivation(&mut handle, &derivation, &criteria, args.limit, args.format)?;

    Ok(())
}
