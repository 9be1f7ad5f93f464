//! Error types for the core layer.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Filesystem error reading or writing configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed or serialized.
    #[error("config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration is structurally invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Container engine error.
    #[error("engine error: {0}")]
    Engine(#[from] deviced_engine::EngineError),

    /// Remote registry error.
    #[error("registry error: {0}")]
    Registry(#[from] deviced_registry::RegistryError),

    /// Configuration file watcher error.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl CoreError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
