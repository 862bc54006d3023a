use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::InfluxDbConfig;
use promviz_core::series::{DataPoint, TimeSeriesResult};

use super::{http_client, parse_base_url, parse_rfc3339, request_error};

const NAME: &str = "influxdb";

/// Flux queries over the InfluxDB 2.x HTTP API
pub struct InfluxDbBackend {
    client: reqwest::Client,
    base_url: String,
    config: InfluxDbConfig,
}

impl InfluxDbBackend {
    pub fn new(config: InfluxDbConfig) -> Result<Self, BackendError> {
        for (value, field) in [
            (&config.token, "token"),
            (&config.org, "organization"),
            (&config.bucket, "bucket"),
        ] {
            if value.is_empty() {
                return Err(BackendError::Build {
                    backend: NAME,
                    reason: format!("InfluxDB {field} is required"),
                });
            }
        }
        Ok(Self {
            client: http_client(NAME)?,
            base_url: parse_base_url(NAME, &config.url)?,
            config,
        })
    }

    /// Turn a bare filter predicate into a full Flux pipeline over the
    /// configured bucket; full queries pass through untouched
    fn build_query(&self, expr: &str) -> String {
        if expr.contains("from(bucket:") {
            return expr.to_string();
        }
        format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -5m)
  |> filter(fn: (r) => {expr})
  |> aggregateWindow(every: 1m, fn: mean, createEmpty: true)
  |> fill(value: 0.0)
  |> sort(columns: ["_time"], desc: true)"#,
            bucket = self.config.bucket,
        )
    }

    async fn run_flux(&self, flux: &str, timeout: Duration) -> Result<String, BackendError> {
        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": { "header": true, "annotations": [], "delimiter": "," },
        });

        let resp = self
            .client
            .post(format!("{}/api/v2/query", self.base_url))
            .query(&[("org", self.config.org.as_str())])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.config.token))
            .header(reqwest::header::ACCEPT, "application/csv")
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(e, timeout))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| request_error(e, timeout))?;
        if !status.is_success() {
            return Err(BackendError::Query(api_error_message(status, &text)));
        }
        Ok(text)
    }
}

#[async_trait]
impl Backend for InfluxDbBackend {
    async fn connect(&self, timeout: Duration) -> Result<(), BackendError> {
        let probe = format!(
            r#"from(bucket: "{}") |> range(start: -1m) |> limit(n: 1)"#,
            self.config.bucket
        );
        self.run_flux(&probe, timeout)
            .await
            .map_err(|e| BackendError::Connect {
                backend: NAME,
                url: self.config.url.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(url = %self.config.url, bucket = %self.config.bucket, "connected to influxdb");
        Ok(())
    }

    async fn query_time_series(
        &self,
        timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError> {
        let flux = self.build_query(expr);
        let csv = self.run_flux(&flux, timeout).await?;
        parse_flux_csv(&csv)
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// `{"code": ..., "message": ...}` bodies from the v2 API
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

/// Parse the annotated-CSV response of a Flux query.
///
/// Each table starts with a header row; tables are separated by blank
/// lines. Rows whose `_time` or `_value` cannot be parsed are skipped.
fn parse_flux_csv(csv: &str) -> Result<TimeSeriesResult, BackendError> {
    let mut points = Vec::new();
    let mut columns: Option<(usize, usize)> = None;
    let mut expect_header = true;

    for line in csv.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            expect_header = true;
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();

        if expect_header {
            expect_header = false;
            if let Some(pos) = fields.iter().position(|f| *f == "error") {
                return Err(BackendError::Query(
                    flux_error_row(csv, pos).unwrap_or_else(|| "flux error".into()),
                ));
            }
            let time = fields.iter().position(|f| *f == "_time");
            let value = fields.iter().position(|f| *f == "_value");
            columns = time.zip(value);
            continue;
        }

        let Some((time_col, value_col)) = columns else {
            continue;
        };
        let (Some(ts), Some(value)) = (fields.get(time_col), fields.get(value_col)) else {
            continue;
        };
        let (Some(timestamp), Ok(value)) = (parse_rfc3339(ts), value.parse::<f64>()) else {
            continue;
        };
        points.push(DataPoint::new(timestamp, value));
    }

    Ok(TimeSeriesResult::new(points))
}

/// Message cell of an in-band `error,reference` table
fn flux_error_row(csv: &str, column: usize) -> Option<String> {
    csv.lines()
        .filter(|l| !l.trim().is_empty())
        .nth(1)
        .and_then(|row| row.split(',').nth(column))
        .map(|s| s.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> InfluxDbBackend {
        InfluxDbBackend::new(InfluxDbConfig {
            url: "http://localhost:8086".into(),
            token: "token".into(),
            org: "acme".into(),
            bucket: "metrics".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_fields() {
        let err = InfluxDbBackend::new(InfluxDbConfig {
            url: "http://localhost:8086".into(),
            token: "token".into(),
            org: String::new(),
            bucket: "metrics".into(),
        })
        .err()
        .unwrap();
        assert_eq!(
            err.to_string(),
            "failed to create influxdb client: InfluxDB organization is required"
        );
        assert_eq!(backend().name(), "influxdb");
    }

    #[test]
    fn test_build_query_wraps_filter() {
        let flux = backend().build_query(r#"r._measurement == "cpu""#);
        assert!(flux.starts_with(r#"from(bucket: "metrics")"#));
        assert!(flux.contains(r#"|> filter(fn: (r) => r._measurement == "cpu")"#));
        assert!(flux.contains("range(start: -5m)"));
        assert!(flux.contains("aggregateWindow(every: 1m, fn: mean, createEmpty: true)"));
    }

    #[test]
    fn test_build_query_passes_full_query_through() {
        let full = r#"from(bucket: "other") |> range(start: -1h)"#;
        assert_eq!(backend().build_query(full), full);
    }

    #[test]
    fn test_parse_flux_csv() {
        let csv = "\
,result,table,_start,_stop,_time,_value,_field,_measurement\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T00:05:00Z,2024-01-01T00:04:00Z,12.5,usage,cpu\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T00:05:00Z,2024-01-01T00:03:00Z,not-a-number,usage,cpu\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T00:05:00Z,2024-01-01T00:02:00Z,,usage,cpu\r
\r
,result,table,_time,_value\r
,_result,1,2024-01-01T00:01:00Z,7\r
";
        let series = parse_flux_csv(csv).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].value, 12.5);
        assert_eq!(series.points[1].value, 7.0);
        assert_eq!(
            series.points[1].timestamp,
            parse_rfc3339("2024-01-01T00:01:00Z").unwrap()
        );
    }

    #[test]
    fn test_parse_flux_csv_empty() {
        assert!(parse_flux_csv("").unwrap().is_empty());
        assert!(parse_flux_csv("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_flux_csv_error_table() {
        let csv = "error,reference\nfailed to compile query,897\n";
        assert_eq!(
            parse_flux_csv(csv),
            Err(BackendError::Query("failed to compile query".into()))
        );
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"code":"unauthorized","message":"unauthorized access"}"#;
        assert_eq!(
            api_error_message(reqwest::StatusCode::UNAUTHORIZED, body),
            "unauthorized access"
        );
        assert_eq!(
            api_error_message(reqwest::StatusCode::BAD_GATEWAY, "<html>"),
            "HTTP 502 Bad Gateway"
        );
    }
}
