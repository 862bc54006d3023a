//! Periodic fan-out of queries to the active backend
//!
//! One refresh cycle spawns one task per configured query. Each task posts a
//! [`RefreshEvent`] to the UI loop as soon as its query resolves, so a slow or
//! failing query never holds back the others. The UI loop is the only owner
//! of panel state; this module never touches it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, BackendError};
use crate::series::{Query, TimeSeriesResult};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of one query in one refresh cycle
#[derive(Clone, Debug)]
pub struct RefreshEvent {
    /// Position of the query in the configured list
    pub index: usize,
    /// Cycle number, starting at 1 and increasing by one per cycle
    pub cycle: u64,
    pub outcome: Result<TimeSeriesResult, BackendError>,
}

#[derive(Clone, Copy, Debug)]
pub struct RefreshSettings {
    pub interval: Duration,
    /// Deadline shared by every query of a cycle
    pub query_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

pub struct Refresher {
    backend: Arc<dyn Backend>,
    queries: Arc<[Query]>,
    settings: RefreshSettings,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<RefreshEvent>,
    in_flight: JoinSet<()>,
    cycle: u64,
}

impl Refresher {
    pub fn new(
        backend: Arc<dyn Backend>,
        queries: Vec<Query>,
        settings: RefreshSettings,
        cancel: CancellationToken,
        event_tx: mpsc::Sender<RefreshEvent>,
    ) -> Self {
        Self {
            backend,
            queries: queries.into(),
            settings,
            cancel,
            event_tx,
            in_flight: JoinSet::new(),
            cycle: 0,
        }
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Number of query tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Start one refresh cycle: one task per query, all launched together
    pub fn spawn_cycle(&mut self) -> u64 {
        self.cycle += 1;
        let cycle = self.cycle;
        let deadline = Instant::now() + self.settings.query_timeout;
        let cycle_cancel = self.cancel.child_token();

        tracing::debug!(cycle, queries = self.queries.len(), "starting refresh cycle");

        for (index, query) in self.queries.iter().enumerate() {
            let backend = self.backend.clone();
            let expr = query.expr.clone();
            let name = query.name.clone();
            let timeout = self.settings.query_timeout;
            let cancel = cycle_cancel.clone();
            let tx = self.event_tx.clone();

            self.in_flight.spawn(async move {
                let outcome = run_query(backend.as_ref(), &expr, timeout, deadline, &cancel).await;

                match &outcome {
                    Err(BackendError::Cancelled) => {
                        tracing::debug!(cycle, query = %name, "query cancelled");
                        return;
                    }
                    Err(err) => tracing::warn!(cycle, query = %name, error = %err, "query failed"),
                    Ok(series) => {
                        tracing::debug!(cycle, query = %name, points = series.len(), "query ok")
                    }
                }

                let _ = tx
                    .send(RefreshEvent {
                        index,
                        cycle,
                        outcome,
                    })
                    .await;
            });
        }

        cycle
    }

    /// Drop handles of tasks that already finished
    fn reap(&mut self) {
        while let Some(res) = self.in_flight.try_join_next() {
            if let Err(e) = res {
                tracing::warn!(error = %e, "refresh task panicked");
            }
        }
    }

    /// Wait for every in-flight query task to finish
    pub async fn drain(&mut self) {
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                tracing::warn!(error = %e, "refresh task panicked");
            }
        }
    }

    /// Run cycles immediately and then on every tick until cancelled, then
    /// wait for in-flight tasks before returning
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                // First tick completes immediately
                _ = ticker.tick() => {
                    self.reap();
                    self.spawn_cycle();
                }
            }
        }

        tracing::debug!(in_flight = self.in_flight.len(), "refresh loop stopping");
        self.drain().await;
        tracing::info!(cycles = self.cycle, "refresh loop stopped");
    }
}

/// Spawn the refresh loop on the current runtime
pub fn spawn_refresher(refresher: Refresher) -> JoinHandle<()> {
    tokio::spawn(refresher.run())
}

/// Run one query bounded by the cycle deadline and the cancellation token
async fn run_query(
    backend: &dyn Backend,
    expr: &str,
    timeout: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<TimeSeriesResult, BackendError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
        res = tokio::time::timeout_at(deadline, backend.query_time_series(timeout, expr)) => {
            res.unwrap_or(Err(BackendError::Timeout(timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::DataPoint;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that answers every expr with `value`, after sleeping `delay`
    /// for exprs named "slow"
    struct ScriptedBackend {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn connect(&self, _timeout: Duration) -> Result<(), BackendError> {
            Ok(())
        }

        async fn query_time_series(
            &self,
            _timeout: Duration,
            expr: &str,
        ) -> Result<TimeSeriesResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match expr {
                "slow" => {
                    tokio::time::sleep(self.delay).await;
                    Ok(TimeSeriesResult::single(DataPoint::new(Utc::now(), 1.0)))
                }
                "broken" => Err(BackendError::Query("bad expr".into())),
                _ => Ok(TimeSeriesResult::single(DataPoint::new(Utc::now(), 2.0))),
            }
        }

        async fn close(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn backend(delay: Duration) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_cycle_fans_out_one_task_per_query() {
        let (tx, mut rx) = mpsc::channel(16);
        let queries = vec![
            Query::new("a", "fast"),
            Query::new("b", "broken"),
            Query::new("c", "fast"),
        ];
        let mut refresher = Refresher::new(
            backend(Duration::ZERO),
            queries,
            RefreshSettings::default(),
            CancellationToken::new(),
            tx,
        );

        assert_eq!(refresher.spawn_cycle(), 1);
        refresher.drain().await;

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events.sort_by_key(|e| e.index);

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.cycle == 1));
        assert!(events[0].outcome.is_ok());
        assert_eq!(
            events[1].outcome,
            Err(BackendError::Query("bad expr".into()))
        );
        assert!(events[2].outcome.is_ok());
    }

    #[tokio::test]
    async fn test_slow_query_times_out_without_blocking_others() {
        let (tx, mut rx) = mpsc::channel(16);
        let settings = RefreshSettings {
            interval: Duration::from_secs(60),
            query_timeout: Duration::from_millis(50),
        };
        let mut refresher = Refresher::new(
            backend(Duration::from_secs(5)),
            vec![Query::new("slow", "slow"), Query::new("fast", "fast")],
            settings,
            CancellationToken::new(),
            tx,
        );

        refresher.spawn_cycle();

        // The fast query is delivered first, while the slow one is pending
        let first = rx.recv().await.unwrap();
        assert_eq!(first.index, 1);
        assert!(first.outcome.is_ok());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.index, 0);
        assert_eq!(
            second.outcome,
            Err(BackendError::Timeout(Duration::from_millis(50)))
        );
        refresher.drain().await;
    }

    #[tokio::test]
    async fn test_run_refreshes_immediately_and_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let scripted = backend(Duration::ZERO);
        let refresher = Refresher::new(
            scripted.clone(),
            vec![Query::new("a", "fast")],
            RefreshSettings {
                interval: Duration::from_secs(60),
                query_timeout: Duration::from_secs(1),
            },
            cancel.clone(),
            tx,
        );
        let handle = spawn_refresher(refresher);

        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.cycle, 1);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scripted.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_queries() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let refresher = Refresher::new(
            backend(Duration::from_secs(30)),
            vec![Query::new("slow", "slow")],
            RefreshSettings {
                interval: Duration::from_secs(60),
                query_timeout: Duration::from_secs(30),
            },
            cancel.clone(),
            tx,
        );
        let handle = spawn_refresher(refresher);

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        // Shutdown finishes promptly and nothing is reported for the
        // cancelled query
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
