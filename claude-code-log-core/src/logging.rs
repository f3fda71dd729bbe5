//! Diagnostics for the conversion pipeline
//!
//! The CLI owns stdout for its result reporting, so diagnostics ride on
//! tracing and land on stderr in a compact `level: message` form. That
//! is the surface where the loader and synchronizer report malformed
//! lines and skipped files, which is why the default level is `warn`:
//! those messages stay visible without drowning the CLI's own output.
//!
//! Long batch runs can additionally mirror diagnostics into a daily
//! rotated file under the XDG state directory by setting
//! `log_to_file = true` in the `[logging]` config section.

use crate::config::{Config, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Flushes pending file writes when dropped. Hold it for the life of
/// the process; when file logging is disabled it is inert.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// The level comes from `RUST_LOG` when set, otherwise from the config.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    let (file_layer, file_guard) = if config.log_to_file {
        let log_dir = Config::state_dir();
        std::fs::create_dir_all(&log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "claude-code-log.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Subscriber for tests: env-filtered, captured by the test harness.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_reentrant() {
        // Only the first global subscriber wins; later calls must not
        // panic the test process.
        init_test();
        init_test();
    }

    #[test]
    fn test_filter_follows_config_level() {
        // init() builds its filter from the config level exactly like
        // this when RUST_LOG is absent.
        let config = LoggingConfig {
            level: "debug".to_string(),
            log_to_file: false,
        };
        let filter = EnvFilter::new(&config.level);
        assert_eq!(filter.to_string(), "debug");
    }
}
