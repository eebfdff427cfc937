//! Dashboard state controller.
//!
//! [`Dashboard`] owns the event snapshot, the filter criteria and the
//! ingestion status. Writers replace the snapshot wholesale under a write
//! lock; readers clone the `Arc` and derive outside the lock, so a
//! derivation pass never observes a half-applied refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use crate::errors::IngestError;
use crate::filters::FilterCriteria;
use crate::models::Event;
use crate::stats::{self, Derivation};

/// Capacity of the update broadcast channel.
const UPDATE_CAPACITY: usize = 64;

/// Change notifications pushed to connected browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardUpdate {
    /// An ingestion cycle finished (successfully or not)
    Refreshed,
    /// The filter criteria changed
    CriteriaChanged,
}

impl DashboardUpdate {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Refreshed => "refreshed",
            Self::CriteriaChanged => "criteria",
        }
    }
}

#[derive(Debug)]
struct DashboardState {
    events: Arc<[Event]>,
    criteria: FilterCriteria,
    error: Option<String>,
    refreshing: bool,
    last_success: Option<DateTime<Utc>>,
}

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ViewStatus {
    /// No ingestion has succeeded yet
    Loading,
    /// The last ingestion failed; stale data is withheld
    Error { message: String },
    Ready(Derivation),
}

/// A read snapshot of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    #[serde(flatten)]
    pub status: ViewStatus,
    pub refreshing: bool,
    /// Events in the raw snapshot, before filtering
    pub snapshot_len: usize,
    pub criteria: FilterCriteria,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Shared dashboard controller.
#[derive(Debug)]
pub struct Dashboard {
    state: RwLock<DashboardState>,
    tx: broadcast::Sender<DashboardUpdate>,
}

impl Dashboard {
    /// Create an empty dashboard in the loading state.
    #[must_use]
    pub fn new(criteria: FilterCriteria) -> Self {
        let (tx, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            state: RwLock::new(DashboardState {
                events: Arc::from(Vec::new()),
                criteria,
                error: None,
                refreshing: false,
                last_success: None,
            }),
            tx,
        }
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.tx.subscribe()
    }

    pub async fn criteria(&self) -> FilterCriteria {
        self.state.read().await.criteria
    }

    pub async fn set_criteria(&self, criteria: FilterCriteria) {
        self.state.write().await.criteria = criteria;
        debug!(
            min_magnitude = criteria.min_magnitude,
            max_age_millis = criteria.max_age_millis,
            "criteria updated"
        );
        self.notify(DashboardUpdate::CriteriaChanged);
    }

    /// Mark an ingestion cycle as in flight.
    pub async fn begin_refresh(&self) {
        self.state.write().await.refreshing = true;
    }

    /// Apply the outcome of an ingestion cycle.
    ///
    /// Success replaces the snapshot and clears the error. Failure keeps
    /// the previous snapshot and records the error message.
    pub async fn apply_ingest(&self, result: Result<Vec<Event>, IngestError>) {
        {
            let mut state = self.state.write().await;
            state.refreshing = false;
            match result {
                Ok(events) => {
                    debug!("snapshot replaced with {} events", events.len());
                    state.events = Arc::from(events);
                    state.error = None;
                    state.last_success = Some(Utc::now());
                }
                Err(e) => {
                    warn!("ingestion failed, keeping previous snapshot: {e}");
                    state.error = Some(e.to_string());
                }
            }
        }
        self.notify(DashboardUpdate::Refreshed);
    }

    /// Derive the view against the current wall clock.
    pub async fn view(&self) -> DashboardView {
        self.view_at(Utc::now().timestamp_millis()).await
    }

    /// Derive the view with `now_millis` as the single time sample.
    pub async fn view_at(&self, now_millis: i64) -> DashboardView {
        let (events, criteria, error, refreshing, last_updated) = {
            let state = self.state.read().await;
            (
                Arc::clone(&state.events),
                state.criteria,
                state.error.clone(),
                state.refreshing,
                state.last_success,
            )
        };

        let status = match (error, last_updated) {
            (Some(message), _) => ViewStatus::Error { message },
            (None, None) => ViewStatus::Loading,
            (None, Some(_)) => ViewStatus::Ready(stats::derive(&events, &criteria, now_millis)),
        };

        DashboardView {
            status,
            refreshing,
            snapshot_len: events.len(),
            criteria,
            last_updated,
        }
    }

    fn notify(&self, update: DashboardUpdate) {
        // No subscribers is fine: nobody has the page open.
        let _ = self.tx.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;

    const NOW: i64 = 1_700_000_000_000;
    const MINUTE: i64 = 60_000;

    fn server_error() -> IngestError {
        IngestError::Status {
            status: 500,
            body: "Internal Server Error".into(),
        }
    }

    #[tokio::test]
    async fn test_starts_loading() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        let view = dashboard.view_at(NOW).await;
        assert_eq!(view.status, ViewStatus::Loading);
        assert!(!view.refreshing);
        assert!(view.last_updated.is_none());
    }

    #[tokio::test]
    async fn test_success_makes_ready() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        dashboard
            .apply_ingest(Ok(vec![
                event("a", 2.0, MINUTE, NOW),
                event("b", 5.5, 2 * 60 * MINUTE, NOW),
            ]))
            .await;

        let view = dashboard.view_at(NOW).await;
        let ViewStatus::Ready(derivation) = view.status else {
            panic!("expected ready view");
        };
        assert_eq!(derivation.statistics.count, 2);
        assert_eq!(derivation.now_millis, NOW);
    }

    #[tokio::test]
    async fn test_failure_keeps_snapshot_and_hides_it() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        dashboard
            .apply_ingest(Ok(vec![event("a", 2.0, MINUTE, NOW)]))
            .await;

        dashboard.begin_refresh().await;
        dashboard.apply_ingest(Err(server_error())).await;

        let view = dashboard.view_at(NOW).await;
        assert_eq!(view.snapshot_len, 1);
        assert!(!view.refreshing);
        match view.status {
            ViewStatus::Error { message } => assert!(message.contains("500")),
            other => panic!("expected error view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_clears_error() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        dashboard.apply_ingest(Err(server_error())).await;
        dashboard
            .apply_ingest(Ok(vec![event("a", 2.0, MINUTE, NOW)]))
            .await;

        let view = dashboard.view_at(NOW).await;
        assert!(matches!(view.status, ViewStatus::Ready(_)));
    }

    #[tokio::test]
    async fn test_criteria_change_rederives_and_notifies() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        let mut rx = dashboard.subscribe();
        dashboard
            .apply_ingest(Ok(vec![
                event("a", 2.0, MINUTE, NOW),
                event("b", 5.5, MINUTE, NOW),
            ]))
            .await;
        assert_eq!(rx.recv().await.unwrap(), DashboardUpdate::Refreshed);

        dashboard
            .set_criteria(FilterCriteria {
                min_magnitude: 3.0,
                ..FilterCriteria::default()
            })
            .await;
        assert_eq!(rx.recv().await.unwrap(), DashboardUpdate::CriteriaChanged);

        let ViewStatus::Ready(derivation) = dashboard.view_at(NOW).await.status else {
            panic!("expected ready view");
        };
        assert_eq!(derivation.events.len(), 1);
        assert_eq!(derivation.events[0].id, "b");
    }

    #[tokio::test]
    async fn test_view_json_shape() {
        let dashboard = Dashboard::new(FilterCriteria::default());
        dashboard.apply_ingest(Err(server_error())).await;

        let json = serde_json::to_value(dashboard.view_at(NOW).await).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("500"));
        assert_eq!(json["criteria"]["max_age_millis"], 86_400_000);
    }
}
