//! End-to-end: refresh loop → events → panel state, the way the UI loop
//! consumes them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use promviz_core::backend::{Backend, BackendError};
use promviz_core::panels::{PanelState, PanelView, WAITING_FOOTER};
use promviz_core::refresh::{RefreshSettings, Refresher, spawn_refresher};
use promviz_core::series::{DataPoint, Query, TimeSeriesResult};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

/// Answers each expr from a fixed table; unknown exprs hang forever
struct TableBackend {
    answers: HashMap<&'static str, TimeSeriesResult>,
}

#[async_trait]
impl Backend for TableBackend {
    async fn connect(&self, _timeout: Duration) -> Result<(), BackendError> {
        Ok(())
    }

    async fn query_time_series(
        &self,
        _timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError> {
        match self.answers.get(expr) {
            Some(series) => Ok(series.clone()),
            None => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

async fn collect(
    rx: &mut mpsc::Receiver<promviz_core::refresh::RefreshEvent>,
    state: &mut PanelState,
    count: usize,
) {
    for _ in 0..count {
        let ev = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("refresh event")
            .expect("channel open");
        state.apply(ev);
    }
}

#[tokio::test]
async fn two_queries_fill_panels_and_footer() {
    let mut answers = HashMap::new();
    answers.insert(
        "three",
        TimeSeriesResult::new(vec![
            DataPoint::new(at(1_000), 1.0),
            DataPoint::new(at(1_060), 2.0),
            DataPoint::new(at(1_120), 3.0),
        ]),
    );
    answers.insert(
        "one",
        TimeSeriesResult::new(vec![DataPoint::new(at(1_200), 7.0)]),
    );

    let queries = vec![Query::new("Three", "three"), Query::new("One", "one")];
    let mut state = PanelState::new(&queries);
    assert_eq!(state.footer_text(), WAITING_FOOTER);

    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = spawn_refresher(Refresher::new(
        Arc::new(TableBackend { answers }),
        queries,
        RefreshSettings {
            interval: Duration::from_secs(60),
            query_timeout: Duration::from_secs(1),
        },
        cancel.clone(),
        tx,
    ));

    collect(&mut rx, &mut state, 2).await;

    assert!(matches!(
        state.history(0).unwrap().view(),
        PanelView::Graph(s) if s.len() == 3
    ));
    assert!(matches!(
        state.history(1).unwrap().view(),
        PanelView::Graph(s) if s.len() == 1
    ));
    assert_eq!(state.time_range(), Some((at(1_000), at(1_200))));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn timed_out_query_shows_error_and_keeps_running() {
    let queries = vec![Query::new("Hangs", "hang")];
    let mut state = PanelState::new(&queries);
    // A reading from before the failing cycle
    state.update(
        0,
        Ok(TimeSeriesResult::new(vec![DataPoint::new(at(500), 4.0)])),
    );

    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = spawn_refresher(Refresher::new(
        Arc::new(TableBackend {
            answers: HashMap::new(),
        }),
        queries,
        RefreshSettings {
            interval: Duration::from_secs(60),
            query_timeout: Duration::from_millis(30),
        },
        cancel.clone(),
        tx,
    ));

    collect(&mut rx, &mut state, 1).await;

    let history = state.history(0).unwrap();
    assert_eq!(
        history.view(),
        PanelView::Error(&BackendError::Timeout(Duration::from_millis(30)))
    );
    assert_eq!(history.series.len(), 1);
    assert!(!handle.is_finished());

    cancel.cancel();
    handle.await.unwrap();
}
