use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::series::Query;

/// Environment variable that overrides the default config path
pub const CONFIG_ENV: &str = "PROMVIZ_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "queries.yaml";

/// Which data source a config selects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Prometheus,
    InfluxDb,
    InfluxDb1,
    Mock,
}

impl BackendKind {
    pub const SUPPORTED: [BackendKind; 4] = [
        BackendKind::Prometheus,
        BackendKind::InfluxDb,
        BackendKind::InfluxDb1,
        BackendKind::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prometheus => "prometheus",
            Self::InfluxDb => "influxdb",
            Self::InfluxDb1 => "influxdb1",
            Self::Mock => "mock",
        }
    }

    fn supported_list() -> String {
        Self::SUPPORTED
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // An omitted backend means Prometheus
            "" | "prometheus" => Ok(Self::Prometheus),
            "influxdb" => Ok(Self::InfluxDb),
            "influxdb1" => Ok(Self::InfluxDb1),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::UnsupportedBackend {
                name: other.to_string(),
                supported: Self::supported_list(),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub url: String,
}

/// InfluxDB 2.x (Flux) connection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InfluxDbConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub bucket: String,
}

/// InfluxDB 1.x (InfluxQL) connection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InfluxDb1Config {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MockConfig {
    /// RNG seed; 0 seeds from the clock
    #[serde(default)]
    pub seed: u64,
}

fn default_refresh_interval() -> u64 {
    5
}
fn default_query_timeout() -> u64 {
    3
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PromvizConfig {
    /// Backend identifier (prometheus, influxdb, influxdb1, mock)
    #[serde(default)]
    pub backend: String,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub influxdb: InfluxDbConfig,

    #[serde(default)]
    pub influxdb1: InfluxDb1Config,

    #[serde(default)]
    pub mock: MockConfig,

    /// Seconds between refresh cycles
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Per-cycle deadline for every query, in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default)]
    pub queries: Vec<Query>,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config file '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported backend: {name} (supported: {supported})")]
    UnsupportedBackend { name: String, supported: String },
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("at least one query is required")]
    NoQueries,
    #[error("query {index}: {field} is required")]
    InvalidQuery { index: usize, field: &'static str },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

impl PromvizConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate configuration from a string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: PromvizConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        tracing::debug!(
            backend = %config.backend_kind()?,
            queries = config.queries.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Resolve the config path: explicit flag, then `PROMVIZ_CONFIG`, then
    /// `queries.yaml` in the working directory
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.backend.parse()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn require(value: &str, field: &'static str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { field });
            }
            Ok(())
        }

        match self.backend_kind()? {
            BackendKind::Prometheus => require(&self.prometheus.url, "prometheus.url")?,
            BackendKind::InfluxDb => {
                require(&self.influxdb.url, "influxdb.url")?;
                require(&self.influxdb.token, "influxdb.token")?;
                require(&self.influxdb.org, "influxdb.org")?;
                require(&self.influxdb.bucket, "influxdb.bucket")?;
            }
            BackendKind::InfluxDb1 => {
                require(&self.influxdb1.url, "influxdb1.url")?;
                require(&self.influxdb1.database, "influxdb1.database")?;
            }
            BackendKind::Mock => {}
        }

        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "refresh_interval_secs",
            });
        }
        if self.query_timeout_secs == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "query_timeout_secs",
            });
        }

        if self.queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }

        for (index, query) in self.queries.iter().enumerate() {
            if query.name.is_empty() {
                return Err(ConfigError::InvalidQuery {
                    index,
                    field: "name",
                });
            }
            if query.expr.is_empty() {
                return Err(ConfigError::InvalidQuery {
                    index,
                    field: "expr",
                });
            }
        }

        Ok(())
    }
}
