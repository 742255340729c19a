//! Tracing subscriber bootstrap.
//!
//! The library only emits `tracing` events; applications embedding the
//! supervisor decide where they go. [`init`] installs a fmt subscriber
//! filtered by `RUST_LOG`, falling back to the configured level.

use crate::error::{HerderError, Result};
use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logging format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-field output
    #[default]
    Full,
    /// Single-line output
    Compact,
    /// JSON lines for log aggregation
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Level used when `RUST_LOG` is unset
    pub level: Level,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Full,
            level: Level::INFO,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Verbose settings for local debugging.
    pub fn debug() -> Self {
        Self {
            format: LogFormat::Compact,
            level: Level::DEBUG,
            with_target: false,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()))
    }
}

/// Install the global subscriber.
///
/// Fails instead of panicking when one is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let result = match config.format {
        LogFormat::Full => registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(config.with_target))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init(),
    };

    result.map_err(|e| HerderError::LogError(e.to_string()))
}
