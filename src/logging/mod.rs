//! Debug logging
//!
//! The logging decorators write human readable progress lines to a
//! [`DebugLogger`]. The default logger forwards them to `tracing` at debug
//! level, so they end up wherever the process sends its logs.

use crate::config::LoggingConfig;
use std::sync::Arc;

/// Sink for debug lines
pub trait DebugLogger: Send + Sync {
    fn debug(&self, message: &str);
}

/// Forwards to `tracing::debug!`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl DebugLogger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "netprobe", "{}", message);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl DebugLogger for NullLogger {
    fn debug(&self, _message: &str) {}
}

/// Shared handle to the default logger
pub fn default_logger() -> Arc<dyn DebugLogger> {
    Arc::new(TracingLogger)
}

/// Install the global `tracing` subscriber described by `config`.
pub fn init(config: &LoggingConfig) -> crate::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(config.level.as_str());
    let result = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        "pretty" => builder.pretty().try_init(),
        other => {
            return Err(crate::Error::Config(format!(
                "Unknown log format: {}",
                other
            )))
        }
    };
    result.map_err(|e| crate::Error::Config(format!("Failed to initialize logging: {}", e)))
}
