//! USGS earthquake feed client.
//!
//! Provides async HTTP access to the GeoJSON summary feeds.
//! Uses reqwest with rustls for TLS.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::errors::IngestError;
use crate::models::{Event, FeatureCollection};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("quakeview/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Longest error body kept in an ingestion error message.
const MAX_ERROR_BODY: usize = 200;

/// Summary feeds covering every magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedType {
    AllHour,
    #[default]
    AllDay,
    AllWeek,
    AllMonth,
}

impl FeedType {
    /// Get the URL path segment for this feed type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllHour => "all_hour",
            Self::AllDay => "all_day",
            Self::AllWeek => "all_week",
            Self::AllMonth => "all_month",
        }
    }

    /// Full URL of this feed on the USGS server.
    #[must_use]
    pub fn url(self) -> String {
        format!(
            "{USGS_BASE_URL}/earthquakes/feed/v1.0/summary/{}.geojson",
            self.as_str()
        )
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_hour" => Ok(Self::AllHour),
            "all_day" => Ok(Self::AllDay),
            "all_week" => Ok(Self::AllWeek),
            "all_month" => Ok(Self::AllMonth),
            _ => Err(format!(
                "unknown feed type: {s} (expected: all_hour, all_day, all_week, all_month)"
            )),
        }
    }
}

/// A source of complete event snapshots.
pub trait FeedSource: Send + Sync + 'static {
    /// Fetch the latest snapshot, in feed order.
    fn fetch(&self) -> impl Future<Output = Result<Vec<Event>, IngestError>> + Send;
}

/// HTTP client for a single GeoJSON feed URL.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    /// Create a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(url: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The feed URL this client polls.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the feed.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a
    /// body that is not a feature collection.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_collection(&self) -> Result<FeatureCollection, IngestError> {
        debug!("fetching feed");

        let response = self.client.get(&self.url).send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(IngestError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let feed: FeatureCollection = serde_json::from_slice(&bytes)?;
        feed.validate()?;

        if let Some(meta) = &feed.metadata {
            debug!(
                generated = meta.generated,
                title = meta.title.as_deref().unwrap_or(""),
                "fetched {} features",
                feed.features.len()
            );
        }
        Ok(feed)
    }
}

impl FeedSource for FeedClient {
    async fn fetch(&self) -> Result<Vec<Event>, IngestError> {
        Ok(self.fetch_collection().await?.into_events())
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;
    use crate::models::fixtures::SAMPLE_FEED;

    /// Serve `router` on a loopback port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_feed_type_parse() {
        assert_eq!("all_week".parse::<FeedType>().unwrap(), FeedType::AllWeek);
        assert_eq!("ALL_DAY".parse::<FeedType>().unwrap(), FeedType::AllDay);
        assert!("4.5_day".parse::<FeedType>().is_err());
    }

    #[test]
    fn test_default_feed_url() {
        assert_eq!(
            FeedType::default().url(),
            "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson"
        );
    }

    #[tokio::test]
    async fn test_fetch_decodes_events() {
        let base = serve(Router::new().route("/feed", get(|| async { SAMPLE_FEED }))).await;
        let client = FeedClient::new(format!("{base}/feed")).unwrap();

        let events = client.fetch().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "ci40000001");
    }

    #[tokio::test]
    async fn test_server_error_is_status_failure() {
        let base = serve(Router::new().route(
            "/feed",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
        ))
        .await;
        let client = FeedClient::new(format!("{base}/feed")).unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, IngestError::Status { status: 500, .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_failure() {
        let base = serve(Router::new().route("/feed", get(|| async { "<html>" }))).await;
        let client = FeedClient::new(format!("{base}/feed")).unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
    }
}
