//! Logging bootstrap for hosts that do not install their own subscriber.
//!
//! Library code logs through the `log` facade; this installs a
//! `tracing-subscriber` registry and bridges `log` records into it, so both
//! `log` records and the `tracing` spans around reconcile tasks reach the
//! same output.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::ConfigError;

/// Installs the global subscriber described by `config`.
///
/// Fails instead of panicking if a global subscriber or `log` logger is
/// already installed. The `log` bridge goes in first, so a host that already
/// owns the `log` logger gets an error with no tracing subscriber installed.
/// If the bridge succeeds but a tracing subscriber is already set, the bridge
/// stays and forwards `log` records to that subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|e| ConfigError::Validation {
        message: format!("Invalid log level '{}': {}", config.level, e),
    })?;

    tracing_log::LogTracer::init().map_err(|e| ConfigError::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
    };
    installed.map_err(|e| ConfigError::Logging(e.to_string()))?;

    log::debug!(
        "Logging initialized (level: {}, format: {:?})",
        config.level,
        config.format
    );
    Ok(())
}
