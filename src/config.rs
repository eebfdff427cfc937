//! Typed dashboard configuration.
//!
//! Built from the parsed command line; every field has a default matching
//! the stock dashboard (USGS past-day feed, five-minute refresh).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::client::FeedType;
use crate::errors::ConfigError;
use crate::filters::FilterCriteria;
use crate::scheduler::DEFAULT_REFRESH_INTERVAL;

/// Shortest refresh interval accepted; shorter values are clamped.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default location of the preference file.
pub const DEFAULT_PREFS_FILE: &str = "quakeview-prefs.json";

/// Configuration for `quakeview serve`.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
    pub feed_url: String,
    pub refresh_interval: Duration,
    pub prefs_path: PathBuf,
    pub criteria: FilterCriteria,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            feed_url: FeedType::default().url(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            prefs_path: PathBuf::from(DEFAULT_PREFS_FILE),
            criteria: FilterCriteria::default(),
        }
    }
}

impl DashboardConfig {
    /// Check the configuration and clamp the refresh interval.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bind address, a non-HTTP feed
    /// URL, or a zero interval.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.bind_addr()?;

        if !(self.feed_url.starts_with("http://") || self.feed_url.starts_with("https://")) {
            return Err(ConfigError::FeedUrl(self.feed_url));
        }

        if self.refresh_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            warn!(
                "refresh interval clamped to minimum of {} seconds",
                MIN_REFRESH_INTERVAL.as_secs()
            );
            self.refresh_interval = MIN_REFRESH_INTERVAL;
        }

        Ok(self)
    }

    /// Socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::BindAddress(addr))
    }
}
