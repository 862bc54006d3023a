//! Tracing subscriber setup for the promviz binary.
//!
//! The terminal belongs to the dashboard, so logs go to `--log-file` when one
//! is given and are discarded otherwise.
//!
//! # Priority (highest to lowest)
//!
//! 1. `PROMVIZ_LOG` env var (per-target directives, e.g. `promviz_core=debug`)
//! 2. `RUST_LOG` env var
//! 3. `--verbose` / `-v` (debug)
//! 4. Default level: `info`

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

pub const LOG_ENV: &str = "PROMVIZ_LOG";

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(log_file: Option<&Path>, verbose: bool) -> std::io::Result<()> {
    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::sink),
    };

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(build_env_filter(verbose))
        .with(fmt_layer)
        .try_init();
    Ok(())
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    // Unparseable directives fall through rather than failing startup
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(default_level(verbose).as_str())
}

fn default_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}
