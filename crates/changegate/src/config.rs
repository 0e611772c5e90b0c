//! Dispatcher configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_MAX_CONCURRENT_RECONCILES: &str = "CHANGEGATE_MAX_CONCURRENT_RECONCILES";
pub const ENV_LOG_LEVEL: &str = "CHANGEGATE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CHANGEGATE_LOG_FORMAT";

/// Tunables for a [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    /// Upper bound on reconciles running at once. `0` means unbounded.
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// Record the fingerprint of each successful apply, so the echo of the
    /// dispatcher's own write is classified as unchanged.
    #[serde(default = "default_true")]
    pub record_applied_versions: bool,

    /// Buffered reports per subscriber before it starts lagging.
    #[serde(default = "default_report_capacity")]
    pub report_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_concurrent_reconciles() -> usize {
    num_cpus::get() * 4
}

fn default_true() -> bool {
    true
}

fn default_report_capacity() -> usize {
    256
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            record_applied_versions: true,
            report_capacity: default_report_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `changegate=debug,warn`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Serialization format of a config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(ConfigFormat::Yaml),
            Some("json") => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

impl DispatcherConfig {
    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.report_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "reportCapacity must be greater than 0".to_string(),
            });
        }

        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.level) {
            return Err(ConfigError::Validation {
                message: format!("Invalid log level '{}': {}", self.logging.level, e),
            });
        }

        Ok(())
    }

    /// Overrides fields from `CHANGEGATE_*` environment variables, then
    /// validates the result.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(ENV_MAX_CONCURRENT_RECONCILES) {
            self.max_concurrent_reconciles =
                value.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidEnv {
                        name: ENV_MAX_CONCURRENT_RECONCILES.to_string(),
                        value: value.clone(),
                        reason: e.to_string(),
                    }
                })?;
        }

        if let Ok(value) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = value;
        }

        if let Ok(value) = std::env::var(ENV_LOG_FORMAT) {
            self.logging.format =
                value
                    .parse()
                    .map_err(|reason: String| ConfigError::InvalidEnv {
                        name: ENV_LOG_FORMAT.to_string(),
                        value: value.clone(),
                        reason,
                    })?;
        }

        self.validate()
    }
}

/// Loads and validates a config file. The format follows the extension.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DispatcherConfig, ConfigError> {
    let path = path.as_ref();
    let format =
        ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, format)
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
) -> Result<DispatcherConfig, ConfigError> {
    let config: DispatcherConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    config.validate()?;

    Ok(config)
}
