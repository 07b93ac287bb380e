//! # Logging
//!
//! Structured logging via `tracing`, initialized once per process.
//!
//! The failure-logging policy for remote calls lives with the callers: the
//! request executor logs expected high-volume transient failures (timeouts,
//! ordinary rate limits) at `debug!` unless verbose diagnostics are enabled.
//! This module only wires up the subscriber.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LoggingConfig, LogFormat};
//!
//! init_logging(LoggingConfig::default().with_format(LogFormat::Compact))
//!     .expect("failed to initialize logging");
//! tracing::info!("engine started");
//! ```

use crate::error::{Error, Result};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    Pretty,
    /// Structured JSON for machine parsing.
    Json,
    /// Single-line compact format.
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Default directive when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"core_mirror=debug,provider_google_drive=trace"`.
    pub default_directive: String,
    /// Display the target module in log lines.
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            default_directive: "info".to_string(),
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    pub fn with_display_target(mut self, display_target: bool) -> Self {
        self.display_target = display_target;
        self
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured default directive. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_directive))
        .map_err(|e| Error::Config(format!("Invalid log directive: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(config.display_target))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(config.display_target))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(config.display_target))
            .try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_default_directive("core_mirror=debug")
            .with_display_target(false);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_directive, "core_mirror=debug");
        assert!(!config.display_target);
    }

    #[test]
    fn init_rejects_bad_directive() {
        let config = LoggingConfig::default().with_default_directive("not===valid");
        // Either the directive is rejected or a subscriber already exists
        // from another test; both are errors here.
        assert!(init_logging(config).is_err() || init_logging(LoggingConfig::default()).is_err());
    }
}
