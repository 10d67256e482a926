//! Structured logging setup using the `tracing` crate.
//!
//! Initialized once by the binder (or any embedding host); the library
//! itself only emits events and never installs a subscriber.

use crate::error::BridgeError;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration for the binder.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset: trace, debug, info, warn,
    /// error, off.
    pub level: String,
    /// Write to stderr with ANSI colors when true.
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            color: true,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<(), BridgeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BridgeError::Config(format!("invalid log level: {}", e)))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(config.color)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("logging already initialized: {}", e)))
}
