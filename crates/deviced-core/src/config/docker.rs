//! Engine client configuration and construction.

use std::path::Path;

use bollard::{Docker, API_DEFAULT_VERSION};
use deviced_engine::DockerEngine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Default engine endpoint.
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Connect timeout in seconds passed to the client.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// TLS material for the engine connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DockerTlsConfig {
    /// CA certificate PEM path.
    pub ca_pem_path: String,
    /// Client certificate PEM path.
    pub cert_pem_path: String,
    /// Client key PEM path.
    pub key_pem_path: String,
}

impl DockerTlsConfig {
    /// Checks that all three PEM paths are set and exist.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first missing piece.
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("ca pem", &self.ca_pem_path),
            ("cert pem", &self.cert_pem_path),
            ("key pem", &self.key_pem_path),
        ];
        for (name, path) in paths {
            if path.is_empty() {
                return Err(CoreError::config(format!("no {name} path specified")));
            }
            if !Path::new(path).exists() {
                return Err(CoreError::config(format!("{name} at {path} not found")));
            }
        }
        Ok(())
    }
}

/// How to reach the container engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DockerClientConfig {
    /// Take the endpoint from `DOCKER_HOST` instead of `endpoint`.
    pub load_from_environment: bool,
    /// Connect with client TLS.
    pub use_tls: bool,
    /// TLS material, when `use_tls` is set.
    pub tls_config: DockerTlsConfig,
    /// Engine endpoint; defaults to the local Unix socket.
    pub endpoint: String,
}

impl DockerClientConfig {
    /// The effective endpoint after defaulting and environment lookup.
    #[must_use]
    pub fn effective_endpoint(&self) -> String {
        if self.load_from_environment {
            return std::env::var("DOCKER_HOST").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        }
        if self.endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            self.endpoint.clone()
        }
    }

    /// Builds the engine client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the TLS material is incomplete or the client
    /// cannot be constructed.
    pub fn build_engine(&self) -> Result<DockerEngine> {
        let endpoint = self.effective_endpoint();
        debug!(endpoint = %endpoint, tls = self.use_tls, "building engine client");

        let docker = if self.use_tls {
            self.tls_config.validate()?;
            Docker::connect_with_ssl(
                &endpoint,
                Path::new(&self.tls_config.key_pem_path),
                Path::new(&self.tls_config.cert_pem_path),
                Path::new(&self.tls_config.ca_pem_path),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )
            .map_err(deviced_engine::EngineError::from)?
        } else if endpoint.starts_with("unix://") {
            Docker::connect_with_unix(&endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                .map_err(deviced_engine::EngineError::from)?
        } else {
            Docker::connect_with_http(&endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                .map_err(deviced_engine::EngineError::from)?
        };

        Ok(DockerEngine::new(docker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_endpoint_defaults() {
        let config = DockerClientConfig::default();
        assert_eq!(config.effective_endpoint(), DEFAULT_ENDPOINT);

        let config = DockerClientConfig {
            endpoint: "tcp://10.0.0.2:2375".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_endpoint(), "tcp://10.0.0.2:2375");
    }

    #[test]
    fn test_tls_validate_requires_paths() {
        let tls = DockerTlsConfig::default();
        assert!(tls.validate().is_err());
    }
}
