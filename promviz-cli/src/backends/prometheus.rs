use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::PrometheusConfig;
use promviz_core::series::{DataPoint, TimeSeriesResult};

use super::{QUERY_STEP, QUERY_WINDOW, http_client, parse_base_url, request_error};

const NAME: &str = "prometheus";

/// PromQL range queries over the Prometheus HTTP API
pub struct PrometheusBackend {
    client: reqwest::Client,
    base_url: String,
    config: PrometheusConfig,
}

/// Envelope shared by every `/api/v1` response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// One series of a `matrix` result; samples are `[unix_seconds, "value"]`
#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    values: Vec<(serde_json::Value, serde_json::Value)>,
}

impl PrometheusBackend {
    pub fn new(config: PrometheusConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(NAME)?,
            base_url: parse_base_url(NAME, &config.url)?,
            config,
        })
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<(reqwest::StatusCode, String), BackendError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| request_error(e, timeout))?;
        Ok((status, body))
    }
}

#[async_trait]
impl Backend for PrometheusBackend {
    async fn connect(&self, timeout: Duration) -> Result<(), BackendError> {
        let end = Utc::now();
        let start = end - chrono::Duration::minutes(1);
        let params = [
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
        ];

        let connect_err = |reason: String| BackendError::Connect {
            backend: NAME,
            url: self.config.url.clone(),
            reason,
        };

        let (status, body) = self
            .get("/api/v1/labels", &params, timeout)
            .await
            .map_err(|e| connect_err(e.to_string()))?;
        if !status.is_success() {
            return Err(connect_err(format!("HTTP {status}")));
        }
        let resp: ApiResponse<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| connect_err(e.to_string()))?;
        if resp.status != "success" {
            return Err(connect_err(resp.error.unwrap_or(resp.status)));
        }

        tracing::info!(url = %self.config.url, "connected to prometheus");
        Ok(())
    }

    async fn query_time_series(
        &self,
        timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError> {
        let end = Utc::now();
        let start = end - chrono::Duration::seconds(QUERY_WINDOW.as_secs() as i64);
        let params = [
            ("query", expr.to_string()),
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
            ("step", QUERY_STEP.as_secs().to_string()),
        ];

        let (status, body) = self.get("/api/v1/query_range", &params, timeout).await?;
        match parse_range_response(&body) {
            // Error bodies usually carry a message; fall back to the status
            Err(BackendError::Decode(_)) if !status.is_success() => {
                Err(BackendError::Query(format!("HTTP {status}")))
            }
            other => other,
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        // Connections are pooled by reqwest and released on drop
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

fn unix_seconds(t: DateTime<Utc>) -> String {
    format!("{:.3}", t.timestamp_millis() as f64 / 1000.0)
}

/// Flatten a `query_range` response into one arrival-ordered series
fn parse_range_response(body: &str) -> Result<TimeSeriesResult, BackendError> {
    let resp: ApiResponse<QueryData> =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;

    if resp.status != "success" {
        return Err(BackendError::Query(
            resp.error.unwrap_or_else(|| format!("status {}", resp.status)),
        ));
    }
    if !resp.warnings.is_empty() {
        tracing::warn!(warnings = ?resp.warnings, "prometheus returned warnings");
    }

    let data = resp
        .data
        .ok_or_else(|| BackendError::Decode("missing data".into()))?;
    if data.result_type != "matrix" {
        return Err(BackendError::UnsupportedResult(data.result_type));
    }

    let matrix: Vec<MatrixSeries> =
        serde_json::from_value(data.result).map_err(|e| BackendError::Decode(e.to_string()))?;

    let points = matrix
        .iter()
        .flat_map(|series| series.values.iter())
        .filter_map(|(ts, value)| parse_sample(ts, value))
        .collect();
    Ok(TimeSeriesResult::new(points))
}

fn parse_sample(ts: &serde_json::Value, value: &serde_json::Value) -> Option<DataPoint> {
    let secs = ts.as_f64()?;
    let timestamp = DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)?;
    let value = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some(DataPoint::new(timestamp, value))
}
