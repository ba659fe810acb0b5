//! Logging initialization.
//!
//! Builds a `tracing` subscriber with:
//! - an `EnvFilter` (the `RUST_LOG` environment variable overrides the
//!   configured level)
//! - a console layer on stderr, so stdout stays free for piped downloads
//! - an optional non-blocking file layer via `tracing-appender`

use std::fs;
use std::io;

use time::format_description::well_known::Rfc3339;
use tracing::Level;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Parse log level string to tracing Level.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialize logging from configuration.
///
/// Returns the file writer guard when file logging is enabled; it must be
/// kept alive until exit or buffered lines are lost.
pub fn init(config: &LoggingConfig) -> io::Result<Option<WorkerGuard>> {
    let level = parse_level(&config.level);

    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(LocalTime::new(Rfc3339));

    let Some(path) = config.file.as_ref() else {
        tracing_subscriber::registry()
            .with(build_filter(level))
            .with(console)
            .try_init()
            .map_err(io::Error::other)?;
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(LocalTime::new(Rfc3339));

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(Some(guard))
}

/// Initialize console-only logging at the given level.
///
/// Silently does nothing if a global subscriber is already installed, which
/// makes it safe to call from tests.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(parse_level(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_known() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_init_console_only_is_idempotent() {
        init_console_only("debug");
        init_console_only("info");
    }
}
