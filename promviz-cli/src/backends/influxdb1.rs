use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::InfluxDb1Config;
use promviz_core::series::{DataPoint, TimeSeriesResult};

use super::{http_client, parse_base_url, parse_rfc3339, request_error};

const NAME: &str = "influxdb1";

/// InfluxQL queries over the InfluxDB 1.x `/query` endpoint
pub struct InfluxDb1Backend {
    client: reqwest::Client,
    base_url: String,
    config: InfluxDb1Config,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxDb1Backend {
    pub fn new(config: InfluxDb1Config) -> Result<Self, BackendError> {
        if config.database.is_empty() {
            return Err(BackendError::Build {
                backend: NAME,
                reason: "InfluxDB v1 database is required".into(),
            });
        }
        Ok(Self {
            client: http_client(NAME)?,
            base_url: parse_base_url(NAME, &config.url)?,
            config,
        })
    }

    async fn run_influxql(
        &self,
        statement: &str,
        database: Option<&str>,
        timeout: Duration,
    ) -> Result<QueryResponse, BackendError> {
        let mut params = vec![("q", statement)];
        if let Some(db) = database {
            params.push(("db", db));
        }

        let mut req = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&params)
            .timeout(timeout);
        if !self.config.username.is_empty() {
            req = req.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let resp = req.send().await.map_err(|e| request_error(e, timeout))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| request_error(e, timeout))?;

        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(BackendError::Query(format!("HTTP {status}")));
            }
            Err(e) => return Err(BackendError::Decode(e.to_string())),
        };
        if let Some(err) = &parsed.error {
            return Err(BackendError::Query(format!("InfluxDB v1 query error: {err}")));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl Backend for InfluxDb1Backend {
    async fn connect(&self, timeout: Duration) -> Result<(), BackendError> {
        self.run_influxql("SHOW DATABASES", None, timeout)
            .await
            .map_err(|e| BackendError::Connect {
                backend: NAME,
                url: self.config.url.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(url = %self.config.url, database = %self.config.database, "connected to influxdb1");
        Ok(())
    }

    async fn query_time_series(
        &self,
        timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError> {
        let statement = build_statement(expr);
        let resp = self
            .run_influxql(&statement, Some(&self.config.database), timeout)
            .await?;
        points_from_response(resp)
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// Full InfluxQL passes through; a bare field name is averaged per minute
/// over the last five minutes
fn build_statement(expr: &str) -> String {
    if expr.to_uppercase().contains("SELECT") {
        return expr.to_string();
    }
    format!(
        r#"SELECT mean("{expr}") FROM "{}" WHERE time >= now() - 5m GROUP BY time(1m) fill(0) ORDER BY time DESC"#,
        default_measurement(expr)
    )
}

/// Guess the measurement a bare field belongs to from keywords in its name
fn default_measurement(expr: &str) -> &'static str {
    if expr.contains("cpu") {
        "cpu"
    } else if expr.contains("memory") || expr.contains("mem") {
        "mem"
    } else if expr.contains("disk") {
        "disk"
    } else if expr.contains("net") {
        "net"
    } else {
        "metrics"
    }
}

/// Points of the first series of the first statement
fn points_from_response(resp: QueryResponse) -> Result<TimeSeriesResult, BackendError> {
    let Some(result) = resp.results.into_iter().next() else {
        return Ok(TimeSeriesResult::default());
    };
    if let Some(err) = result.error {
        return Err(BackendError::Query(format!("InfluxDB v1 query error: {err}")));
    }
    let Some(series) = result.series.into_iter().next() else {
        return Ok(TimeSeriesResult::default());
    };

    let points = series
        .values
        .iter()
        .filter_map(|row| {
            let [ts, value, ..] = row.as_slice() else {
                return None;
            };
            let timestamp = parse_rfc3339(ts.as_str()?)?;
            // fill(0) semantics for empty buckets
            let value = if value.is_null() { 0.0 } else { to_f64(value)? };
            Some(DataPoint::new(timestamp, value))
        })
        .collect();
    Ok(TimeSeriesResult::new(points))
}

fn to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<TimeSeriesResult, BackendError> {
        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        points_from_response(resp)
    }

    #[test]
    fn test_build_statement() {
        assert_eq!(
            build_statement("usage_idle"),
            r#"SELECT mean("usage_idle") FROM "metrics" WHERE time >= now() - 5m GROUP BY time(1m) fill(0) ORDER BY time DESC"#
        );
        assert!(build_statement("cpu_usage").contains(r#"FROM "cpu""#));
        let full = r#"select mean("x") from "y""#;
        assert_eq!(build_statement(full), full);
    }

    #[test]
    fn test_default_measurement() {
        assert_eq!(default_measurement("usage_cpu"), "cpu");
        assert_eq!(default_measurement("memory_used"), "mem");
        assert_eq!(default_measurement("mem_free"), "mem");
        assert_eq!(default_measurement("disk_io"), "disk");
        assert_eq!(default_measurement("net_bytes"), "net");
        assert_eq!(default_measurement("temperature"), "metrics");
    }

    #[test]
    fn test_parse_series() {
        let body = r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","columns":["time","mean"],
            "values":[["2024-01-01T00:04:00Z",12.5],["2024-01-01T00:03:00Z",null],
                      ["2024-01-01T00:02:00Z","7.25"],["bad-time",1],["2024-01-01T00:01:00Z",true],
                      ["2024-01-01T00:00:00Z"]]}]}]}"#;
        let series = parse(body).unwrap();
        let values: Vec<f64> = series.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![12.5, 0.0, 7.25]);
    }

    #[test]
    fn test_parse_empty_results() {
        assert!(parse(r#"{"results":[]}"#).unwrap().is_empty());
        assert!(parse(r#"{"results":[{"statement_id":0}]}"#).unwrap().is_empty());
        assert!(
            parse(r#"{"results":[{"statement_id":0,"series":[{"name":"cpu","columns":["time","mean"]}]}]}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_parse_statement_error() {
        assert_eq!(
            parse(r#"{"results":[{"statement_id":0,"error":"database not found: telegraf"}]}"#),
            Err(BackendError::Query(
                "InfluxDB v1 query error: database not found: telegraf".into()
            ))
        );
    }

    #[test]
    fn test_new_requires_database() {
        assert!(
            InfluxDb1Backend::new(InfluxDb1Config {
                url: "http://localhost:8086".into(),
                ..Default::default()
            })
            .is_err()
        );
    }
}
