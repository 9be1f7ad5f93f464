//! Error types for engine operations.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur talking to the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error reported by the Docker client or daemon.
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    /// Engine client configuration error (endpoint, TLS material).
    #[error("engine configuration error: {0}")]
    Config(String),

    /// Catch-all for fake/test backends.
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means "the container is already running".
    ///
    /// The engine answers a start of a running container with 304 Not
    /// Modified; older daemons word it in the message instead.
    #[must_use]
    pub fn is_already_started(&self) -> bool {
        match self {
            Self::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            }) => {
                *status_code == 304
                    || message.contains("already started")
                    || message.contains("already running")
            }
            Self::Docker(_) | Self::Config(_) => false,
            Self::Other(msg) => {
                msg.contains("already started") || msg.contains("already running")
            }
        }
    }
}
