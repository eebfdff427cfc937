//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing. Options can also be set
//! through `QUAKEVIEW_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::client::FeedType;
use crate::config::{DEFAULT_PREFS_FILE, DashboardConfig};
use crate::filters::{FilterCriteria, TimeWindow};
use crate::output::Format;

/// Live earthquake dashboard for the USGS feed.
#[derive(Parser, Debug)]
#[command(name = "quakeview")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the browser dashboard
    #[command(alias = "ui")]
    Serve(ServeArgs),

    /// Fetch once, filter, and print events with statistics
    Snapshot(SnapshotArgs),
}

/// Feed selection shared by both commands.
#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Summary feed to poll
    #[arg(long, default_value = "all_day", value_parser = parse_feed_type)]
    pub feed: FeedType,

    /// Full feed URL (overrides --feed)
    #[arg(long, env = "QUAKEVIEW_FEED_URL")]
    pub feed_url: Option<String>,
}

impl FeedArgs {
    /// The URL to fetch.
    #[must_use]
    pub fn url(&self) -> String {
        self.feed_url.clone().unwrap_or_else(|| self.feed.url())
    }
}

/// Filter criteria shared by both commands.
#[derive(Args, Debug)]
pub struct CriteriaArgs {
    /// Minimum magnitude to show (0-8)
    #[arg(long, default_value = "0", value_parser = parse_magnitude)]
    pub min_magnitude: f64,

    /// Time period: hour, day or week
    #[arg(long, default_value = "day", value_parser = parse_period)]
    pub period: TimeWindow,
}

impl CriteriaArgs {
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            min_magnitude: self.min_magnitude,
            max_age_millis: self.period.as_millis(),
        }
    }
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080", env = "QUAKEVIEW_PORT")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1", env = "QUAKEVIEW_HOST")]
    pub host: String,

    #[command(flatten)]
    pub feed: FeedArgs,

    /// Refresh interval in seconds (minimum 30)
    #[arg(long, default_value = "300", env = "QUAKEVIEW_REFRESH_INTERVAL")]
    pub refresh_interval: u64,

    /// File holding the persisted theme preference
    #[arg(long, default_value = DEFAULT_PREFS_FILE, env = "QUAKEVIEW_PREFS_FILE")]
    pub prefs_file: PathBuf,

    #[command(flatten)]
    pub criteria: CriteriaArgs,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

impl ServeArgs {
    /// Typed configuration for the server.
    #[must_use]
    pub fn config(&self) -> DashboardConfig {
        DashboardConfig {
            host: self.host.clone(),
            port: self.port,
            feed_url: self.feed.url(),
            refresh_interval: Duration::from_secs(self.refresh_interval),
            prefs_path: self.prefs_file.clone(),
            criteria: self.criteria.criteria(),
        }
    }
}

/// Arguments for the `snapshot` command.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    #[command(flatten)]
    pub criteria: CriteriaArgs,

    /// Maximum number of events to list
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Parse a feed type from string.
fn parse_feed_type(s: &str) -> Result<FeedType, String> {
    s.parse()
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a time period from string.
fn parse_period(s: &str) -> Result<TimeWindow, String> {
    s.parse()
}

/// Parse a magnitude within the slider's range.
fn parse_magnitude(s: &str) -> Result<f64, String> {
    let mag: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid magnitude: {e}"))?;
    FilterCriteria::from_controls(mag, TimeWindow::default().as_millis())?;
    Ok(mag)
}
