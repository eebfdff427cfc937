//! Error types for quakeview.
//!
//! Uses `thiserror` for library-style error definitions. Ingestion
//! failures are the only domain error; the rest cover the preference
//! file, configuration and the JSON API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while fetching or decoding the earthquake feed.
///
/// Every variant is an ingestion failure: it is caught at the fetch
/// boundary and turned into the dashboard's error message.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Transport failure (DNS, connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Feed answered with a non-success status
    #[error("feed returned HTTP error (status {status}): {body}")]
    Status { status: u16, body: String },

    /// JSON decoding failed
    #[error("failed to parse feed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Decoded JSON is not a feature collection
    #[error("invalid feed response: {0}")]
    InvalidResponse(String),
}

/// Errors from the persisted preference file.
#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("preference file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("preference file must hold a JSON object")]
    NotAnObject,
}

/// Errors found while validating the dashboard configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("invalid feed URL '{0}': expected http:// or https://")]
    FeedUrl(String),

    #[error("refresh interval must be positive")]
    ZeroInterval,
}

/// Errors returned by the JSON API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Criteria outside the ranges the filter controls allow
    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Preference could not be persisted
    #[error(transparent)]
    Preferences(#[from] PrefsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidCriteria(_) => StatusCode::BAD_REQUEST,
            Self::Preferences(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
