use std::{
    fs::{self, OpenOptions},
    sync::Arc,
};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogSettings;

/// Installs the global subscriber: console output plus an append-only file at
/// `{LOG_DIR}/{LOG_FILE}`. `RUST_LOG` takes precedence over the configured
/// level; `debug` forces debug output.
pub fn init(service_name: &str, settings: &LogSettings, debug: bool) -> Result<()> {
    let level = if debug {
        "debug"
    } else {
        tracing_level(&settings.level)
    };

    let path = settings.file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(build_filter(level)?);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_writer(Arc::new(log_file))
        .with_filter(build_filter(level)?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(service = service_name, level, file = %path.display(), "logging initialized");
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(format!("{level},hyper=warn,sqlx=warn"))
            .with_context(|| format!("invalid log level '{level}'")),
    }
}

/// Maps the conventional level names (`WARNING`, `CRITICAL`, ...) onto
/// tracing levels. Unknown names fall back to `info`.
pub fn tracing_level(name: &str) -> &'static str {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" | "FATAL" => "error",
        _ => "info",
    }
}
