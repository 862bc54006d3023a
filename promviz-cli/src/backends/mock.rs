use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use promviz_core::backend::{Backend, BackendError};
use promviz_core::config::MockConfig;
use promviz_core::series::{DataPoint, TimeSeriesResult};

const NAME: &str = "mock";
const POINTS: i64 = 5;

/// Generates plausible-looking data for demos and for running without a
/// metrics server
pub struct MockBackend {
    rng: Mutex<StdRng>,
    connect_delay: Duration,
    max_query_delay_ms: u64,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            rng: Mutex::new(rng),
            connect_delay: Duration::from_millis(100),
            max_query_delay_ms: 50,
        }
    }

    #[cfg(test)]
    pub fn without_delays(mut self) -> Self {
        self.connect_delay = Duration::ZERO;
        self.max_query_delay_ms = 0;
        self
    }

    fn generate(&self, expr: &str) -> Result<(Duration, TimeSeriesResult), BackendError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| BackendError::Query("mock generator unavailable".into()))?;

        let delay = Duration::from_millis(rng.gen_range(0..=self.max_query_delay_ms));
        let (base, spread) = value_range(expr);
        let now = Utc::now();

        // One point per minute, oldest first, ending now
        let points = (0..POINTS)
            .rev()
            .map(|minutes_ago| {
                DataPoint::new(
                    now - chrono::Duration::minutes(minutes_ago),
                    base + rng.r#gen::<f64>() * spread,
                )
            })
            .collect();
        Ok((delay, TimeSeriesResult::new(points)))
    }
}

/// (base, spread) of generated values for well-known demo expressions
fn value_range(expr: &str) -> (f64, f64) {
    match expr {
        "cpu_usage" => (50.0, 30.0),
        "memory_usage" => (4000.0, 2000.0),
        "disk_usage" => (20.0, 40.0),
        "network_bytes" => (1000.0, 5000.0),
        _ => (0.0, 1000.0),
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn connect(&self, _timeout: Duration) -> Result<(), BackendError> {
        tokio::time::sleep(self.connect_delay).await;
        tracing::info!("connected to mock backend");
        Ok(())
    }

    async fn query_time_series(
        &self,
        _timeout: Duration,
        expr: &str,
    ) -> Result<TimeSeriesResult, BackendError> {
        let (delay, series) = self.generate(expr)?;
        tokio::time::sleep(delay).await;
        Ok(series)
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(seed: u64) -> MockBackend {
        MockBackend::new(MockConfig { seed }).without_delays()
    }

    #[tokio::test]
    async fn test_generates_five_points_in_range() {
        let mock = backend(42);
        mock.connect(Duration::from_secs(1)).await.unwrap();

        let series = mock
            .query_time_series(Duration::from_secs(1), "cpu_usage")
            .await
            .unwrap();
        assert_eq!(series.len(), 5);
        assert!(series.points.iter().all(|p| (50.0..80.0).contains(&p.value)));
        assert!(
            series
                .points
                .windows(2)
                .all(|w| w[0].timestamp < w[1].timestamp)
        );

        let series = mock
            .query_time_series(Duration::from_secs(1), "memory_usage")
            .await
            .unwrap();
        assert!(series.points.iter().all(|p| (4000.0..6000.0).contains(&p.value)));
        assert!(mock.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_same_seed_same_values() {
        let a = backend(7)
            .query_time_series(Duration::from_secs(1), "other")
            .await
            .unwrap();
        let b = backend(7)
            .query_time_series(Duration::from_secs(1), "other")
            .await
            .unwrap();
        let va: Vec<f64> = a.points.iter().map(|p| p.value).collect();
        let vb: Vec<f64> = b.points.iter().map(|p| p.value).collect();
        assert_eq!(va, vb);
        assert!(va.iter().all(|v| (0.0..1000.0).contains(v)));
    }

    #[test]
    fn test_name() {
        assert_eq!(backend(1).name(), "mock");
    }
}
