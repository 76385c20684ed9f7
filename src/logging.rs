//!
//! src/logging.rs  Andrew Belles  Oct 18th, 2026
//!
//! Initializes logger for both binaries so a collector run and a
//! dashboard session give informative, structured output
//!
//!

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_error::ErrorLayer;
use tracing_appender::non_blocking;

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::EtlError;

/// Flushes buffered log lines when dropped, hold it until main returns
pub struct LoggingGuard {
    _worker: tracing_appender::non_blocking::WorkerGuard
}

fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter, EtlError> {
    match std::env::var("RUST_LOG").ok().filter(|s| !s.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives),
        None => EnvFilter::try_new(&cfg.filter_directives)
    }
    .map_err(|e| EtlError::Config(format!("log filter: {e}")))
}

pub fn init_logging(cfg: &LoggingConfig) -> Result<LoggingGuard, EtlError> {
    let (writer, guard) = non_blocking(std::io::stderr());
    let filter = build_filter(cfg)?;
    let time = fmt::time::UtcTime::rfc_3339();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    match cfg.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(false)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(true);
            registry.with(fmt_layer).try_init()
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .with_writer(writer)
                .with_timer(time)
                .with_ansi(cfg.with_ansi)
                .with_target(cfg.include_target)
                .with_file(cfg.include_file_line)
                .with_line_number(cfg.include_file_line)
                .pretty();
            registry.with(fmt_layer).try_init()
        }
    }
    .map_err(|e| EtlError::Config(format!("install subscriber: {e}")))?;

    Ok( LoggingGuard { _worker: guard } )
}
