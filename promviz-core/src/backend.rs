use std::time::Duration;

use async_trait::async_trait;

use crate::series::TimeSeriesResult;

/// Errors produced by a backend client.
///
/// Cloneable so a per-query failure can be stored against its panel and
/// carried through refresh events.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create {backend} client: {reason}")]
    Build {
        backend: &'static str,
        reason: String,
    },
    #[error("failed to connect to {backend} at {url}: {reason}")]
    Connect {
        backend: &'static str,
        url: String,
        reason: String,
    },
    #[error("query failed: {0}")]
    Query(String),
    #[error("unsupported result type for range query: {0}")]
    UnsupportedResult(String),
    #[error("error reading query result: {0}")]
    Decode(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
    #[error("failed to close {backend} client: {reason}")]
    Close {
        backend: &'static str,
        reason: String,
    },
}

/// A pluggable metric data source.
///
/// Implementations wrap one query language/protocol:
/// - `PrometheusBackend`: PromQL range queries
/// - `InfluxDbBackend`: Flux over the v2 HTTP API
/// - `InfluxDb1Backend`: InfluxQL over the v1 HTTP API
/// - `MockBackend`: seeded random data for demos and tests
///
/// `query_time_series` is called concurrently from many refresh tasks, so
/// implementations must be `Send + Sync` and hold no per-call state behind
/// `&mut self`. `connect` and `close` are each called once, outside of any
/// concurrent querying.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Lightweight connectivity probe. A failure here aborts startup.
    async fn connect(&self, timeout: Duration) -> Result<(), BackendError>;

    /// Run `expr` over the backend's trailing window (5 minutes for the
    /// bundled backends). Unparseable values are dropped; an unreadable
    /// response is an error. An empty result is not an error.
    async fn query_time_series(
        &self,
        timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError>;

    /// Release held resources. Safe to call even if `connect` never succeeded.
    async fn close(&self) -> Result<(), BackendError>;

    /// Stable, non-empty identifier used in the header and in logs
    fn name(&self) -> &'static str;
}
