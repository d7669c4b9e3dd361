//! Logging setup: JSON-capable `tracing` subscriber with console and
//! rolling-file output, local-timezone timestamps.

use std::path::PathBuf;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "xg2g=info,sqlx=warn,tower_http=info";

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize the global subscriber. Returns a guard that must be kept
/// alive for the process lifetime to flush the non-blocking file writer.
pub fn init_logging(log_dir: &str) -> crate::error::Result<WorkerGuard> {
    let log_path = PathBuf::from(log_dir);
    std::fs::create_dir_all(&log_path).map_err(crate::error::Error::Io)?;

    let file_appender = tracing_appender::rolling::daily(&log_path, "xg2g.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_timer(LocalTimer).json())
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("failed to install tracing subscriber: {e}")))?;

    Ok(guard)
}

/// Path used for request-correlation log fields: mirrors teacher's module
/// list for what's worth separately filtering.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("xg2g", "Main application"),
        ("sqlx", "Database queries"),
        ("reqwest", "HTTP requests to the receiver"),
        ("tower_http", "HTTP middleware"),
    ]
}
