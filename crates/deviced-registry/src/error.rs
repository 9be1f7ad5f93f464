//! Error types for registry operations.

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur talking to a remote registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP transport error.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be parsed.
    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    /// Token or basic authentication failed.
    #[error("registry auth error: {0}")]
    Auth(String),

    /// Registry answered with an unexpected status or body.
    #[error("registry error: {0}")]
    Registry(String),
}
