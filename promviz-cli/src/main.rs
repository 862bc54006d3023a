mod app;
mod backends;
mod logging;
mod ui;

use std::path::PathBuf;

use clap::Parser;

use promviz_core::config::{ConfigError, PromvizConfig};

use app::{App, AppError};

#[derive(Parser)]
#[command(name = "promviz")]
#[command(about = "Live terminal graphs for Prometheus and InfluxDB queries", long_about = None)]
struct Cli {
    /// Path to the configuration file (falls back to $PROMVIZ_CONFIG, then queries.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Load the config, connect to the backend, and exit
    #[arg(long)]
    check: bool,
}

const EXAMPLE_CONFIGS: &str = r#"Example configurations:

Prometheus:
prometheus:
  url: "http://localhost:9090"

queries:
  - name: CPU Usage
    expr: rate(node_cpu_seconds_total{mode="user"}[5m])
  - name: Memory Usage
    expr: node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes

InfluxDB v2 (Flux):
backend: influxdb
influxdb:
  url: "http://localhost:8086"
  token: "your-token"
  org: "your-org"
  bucket: "metrics"

queries:
  - name: CPU Usage
    expr: 'r._measurement == "cpu" and r._field == "usage_percent"'

InfluxDB v1 (InfluxQL):
backend: influxdb1
influxdb1:
  url: "http://localhost:8086"
  username: "admin"
  password: "password"
  database: "telegraf"

queries:
  - name: CPU Usage
    expr: 'SELECT mean("usage_idle") FROM "cpu" WHERE time >= now() - 5m'
"#;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.log_file.as_deref(), cli.verbose) {
        eprintln!("Error: failed to open log file: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        if let AppError::Config(ConfigError::NotFound(path)) = &e {
            eprintln!("Error: Configuration file '{}' does not exist.", path.display());
            eprintln!(
                "Please create a configuration file or specify a different path with --config.\n"
            );
            eprint!("{EXAMPLE_CONFIGS}");
        } else {
            eprintln!("Error: {e}");
        }
        tracing::error!(error = %e, "promviz exited with an error");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let path = PromvizConfig::resolve_path(cli.config);
    let config = PromvizConfig::load(&path)?;
    tracing::info!(path = %path.display(), "config loaded");

    let mut app = App::new(config)?;
    app.connect().await?;

    if cli.check {
        println!("Connected to {} backend", app.backend_name());
        app.shutdown(None).await;
        return Ok(());
    }

    app.run().await
}
