//! Periodic ingestion.
//!
//! [`Ingestor::refresh`] runs one fetch-and-apply cycle.
//! [`spawn`] runs a cycle at startup and then on a fixed interval until
//! the returned [`SchedulerHandle`] is shut down or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::FeedSource;
use crate::dashboard::Dashboard;

/// Default refresh interval (five minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Binds a feed source to the dashboard it refreshes.
pub struct Ingestor<S> {
    source: S,
    dashboard: Arc<Dashboard>,
}

impl<S: FeedSource> Ingestor<S> {
    pub fn new(source: S, dashboard: Arc<Dashboard>) -> Self {
        Self { source, dashboard }
    }

    /// Fetch the feed once and apply the outcome to the dashboard.
    ///
    /// Returns `true` when the snapshot was replaced.
    pub async fn refresh(&self) -> bool {
        self.dashboard.begin_refresh().await;
        let result = self.source.fetch().await;
        let ok = result.is_ok();
        self.dashboard.apply_ingest(result).await;
        ok
    }
}

/// Owns the background refresh task.
///
/// Dropping the handle aborts the task; [`SchedulerHandle::shutdown`]
/// stops it after any in-flight cycle completes.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the timer and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("refresh task ended abnormally: {e}");
            }
        }
        debug!("refresh scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Start refreshing: once immediately, then every `interval`.
pub fn spawn<S: FeedSource>(ingestor: Ingestor<S>, interval: Duration) -> SchedulerHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    cycle += 1;
                    if ingestor.refresh().await {
                        debug!(cycle, "refresh succeeded");
                    } else {
                        debug!(cycle, "refresh failed, retrying in {}s", interval.as_secs());
                    }
                }
            }
        }
    });

    info!("refreshing feed every {}s", interval.as_secs());

    SchedulerHandle {
        stop: Some(stop_tx),
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::dashboard::ViewStatus;
    use crate::errors::IngestError;
    use crate::filters::FilterCriteria;
    use crate::models::Event;
    use crate::models::fixtures::event;

    const NOW: i64 = 1_700_000_000_000;

    /// Replays scripted outcomes, then keeps failing.
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<Result<Vec<Event>, IngestError>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<Result<Vec<Event>, IngestError>>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Arc::clone(&calls),
            };
            (source, calls)
        }
    }

    impl FeedSource for ScriptedSource {
        async fn fetch(&self) -> Result<Vec<Event>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(IngestError::InvalidResponse("script exhausted".into())))
        }
    }

    fn status(code: u16) -> IngestError {
        IngestError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_refresh_http_500_keeps_snapshot() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, _) = ScriptedSource::new(vec![
            Ok(vec![event("a", 2.0, 1_000, NOW), event("b", 5.5, 2_000, NOW)]),
            Err(status(500)),
        ]);
        let ingestor = Ingestor::new(source, Arc::clone(&dashboard));

        assert!(ingestor.refresh().await);
        assert!(!ingestor.refresh().await);

        let view = dashboard.view_at(NOW).await;
        assert_eq!(view.snapshot_len, 2);
        assert!(!view.refreshing);
        match view.status {
            ViewStatus::Error { message } => assert!(message.contains("500")),
            other => panic!("expected error view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_failure_leaves_no_data() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, _) = ScriptedSource::new(vec![Err(status(503))]);
        let ingestor = Ingestor::new(source, Arc::clone(&dashboard));

        assert!(!ingestor.refresh().await);
        let view = dashboard.view_at(NOW).await;
        assert_eq!(view.snapshot_len, 0);
        assert!(matches!(view.status, ViewStatus::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_at_startup_then_on_interval() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, calls) = ScriptedSource::new(vec![Ok(vec![]), Ok(vec![]), Ok(vec![])]);
        let handle = spawn(
            Ingestor::new(source, Arc::clone(&dashboard)),
            DEFAULT_REFRESH_INTERVAL,
        );

        // Startup cycle runs without waiting for the interval.
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        time::sleep(DEFAULT_REFRESH_INTERVAL).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        time::sleep(DEFAULT_REFRESH_INTERVAL).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timer() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, calls) = ScriptedSource::new(vec![Ok(vec![])]);
        let handle = spawn(
            Ingestor::new(source, Arc::clone(&dashboard)),
            DEFAULT_REFRESH_INTERVAL,
        );

        time::sleep(Duration::from_millis(10)).await;
        handle.shutdown().await;

        time::sleep(DEFAULT_REFRESH_INTERVAL * 3).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_task() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, calls) = ScriptedSource::new(vec![]);
        let handle = spawn(
            Ingestor::new(source, Arc::clone(&dashboard)),
            DEFAULT_REFRESH_INTERVAL,
        );

        time::sleep(Duration::from_millis(10)).await;
        drop(handle);

        time::sleep(DEFAULT_REFRESH_INTERVAL * 2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retried_next_tick() {
        let dashboard = Arc::new(Dashboard::new(FilterCriteria::default()));
        let (source, _) = ScriptedSource::new(vec![
            Err(status(500)),
            Ok(vec![event("a", 3.1, 1_000, NOW)]),
        ]);
        let handle = spawn(
            Ingestor::new(source, Arc::clone(&dashboard)),
            DEFAULT_REFRESH_INTERVAL,
        );

        time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(
            dashboard.view_at(NOW).await.status,
            ViewStatus::Error { .. }
        ));

        time::sleep(DEFAULT_REFRESH_INTERVAL).await;
        assert!(matches!(
            dashboard.view_at(NOW).await.status,
            ViewStatus::Ready(_)
        ));
        assert_eq!(dashboard.view_at(NOW).await.snapshot_len, 1);

        handle.shutdown().await;
    }
}
