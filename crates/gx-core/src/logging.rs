//! Logging initialization for the emulator

use crate::config::LogLevel;

/// Install the global tracing subscriber.
///
/// The `RUST_LOG` environment variable wins over the configured level so a
/// single run can be turned up without touching the config file. Calling
/// this more than once is a no-op.
pub fn init(level: LogLevel) {
    let default_filter = match level {
        LogLevel::Off => "off",
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
