mod influxdb;
mod influxdb1;
mod mock;
mod prometheus;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::{BackendKind, ConfigError, PromvizConfig};

pub use influxdb::InfluxDbBackend;
pub use influxdb1::InfluxDb1Backend;
pub use mock::MockBackend;
pub use prometheus::PrometheusBackend;

/// Trailing window every bundled backend queries
pub const QUERY_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Resolution of the trailing window
pub const QUERY_STEP: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Build the backend selected by the configuration
pub fn create_backend(config: &PromvizConfig) -> Result<Arc<dyn Backend>, FactoryError> {
    let backend: Arc<dyn Backend> = match config.backend_kind()? {
        BackendKind::Prometheus => Arc::new(PrometheusBackend::new(config.prometheus.clone())?),
        BackendKind::InfluxDb => Arc::new(InfluxDbBackend::new(config.influxdb.clone())?),
        BackendKind::InfluxDb1 => Arc::new(InfluxDb1Backend::new(config.influxdb1.clone())?),
        BackendKind::Mock => Arc::new(MockBackend::new(config.mock.clone())),
    };
    tracing::info!(backend = backend.name(), "backend created");
    Ok(backend)
}

/// Shared HTTP client; per-request timeouts are set by each call
fn http_client(backend: &'static str) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .user_agent(concat!("promviz/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BackendError::Build {
            backend,
            reason: e.to_string(),
        })
}

/// Reject URLs reqwest could never send to
fn parse_base_url(backend: &'static str, url: &str) -> Result<String, BackendError> {
    reqwest::Url::parse(url).map_err(|e| BackendError::Build {
        backend,
        reason: format!("invalid URL '{url}': {e}"),
    })?;
    Ok(url.trim_end_matches('/').to_string())
}

fn request_error(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Query(err.to_string())
    }
}

/// Parse an RFC 3339 timestamp as returned by the InfluxDB APIs
fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
