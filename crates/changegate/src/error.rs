use std::path::PathBuf;
use thiserror::Error;

use crate::resource::ResourceIdentity;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Change subscription failed: {0}")]
    Subscription(#[from] StreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures of the change subscription transport. Always fatal to the
/// consumption loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Subscription transport failed: {0}")]
    Transport(String),

    #[error("Subscription lagged behind and dropped {0} notifications")]
    Lagged(u64),

    #[error("Subscription is closed")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Version conflict on {identity}: submitted '{expected}', store has '{actual}'")]
    Conflict {
        identity: ResourceIdentity,
        expected: String,
        actual: String,
    },

    #[error("Resource not found: {0}")]
    NotFound(ResourceIdentity),

    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourceIdentity),

    #[error("Store request failed: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns true if the store rejected the write because the submitted
    /// version token was stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Reconcile failed: {0}")]
    Failed(String),

    #[error("Reconcile store access failed: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn failed(message: impl Into<String>) -> Self {
        ReconcileError::Failed(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Unsupported config format for '{0}', expected .yaml, .yml or .json")]
    UnsupportedFormat(PathBuf),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
