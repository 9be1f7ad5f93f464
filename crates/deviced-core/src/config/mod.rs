//! Daemon configuration.
//!
//! A single YAML file (default `/etc/deviced.yaml`) declares everything the
//! daemon manages. Keys are camelCase; the engine passthrough blocks inside
//! targets use the engine API's own field casing.
//!
//! ```yaml
//! imageConfig:
//!   recheckPeriod: 60
//! repos:
//!   - url: registry.example.com
//! containers:
//!   - id: web
//!     image: acme/web
//!     versions: [v2, v1]
//! networks:
//!   - name: backplane
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

pub mod container;
pub mod docker;
pub mod image;
pub mod network;
pub mod repository;
pub mod watcher;

pub use container::{
    ContainerWorkerConfig, LifecycleExecHook, LifecycleHook, LifecycleHookSet, TargetContainer,
    TargetNetworkingConfig, DEFAULT_HOOK_TIMEOUT, UNACCEPTABLE_SCORE,
};
pub use docker::{DockerClientConfig, DockerTlsConfig, DEFAULT_ENDPOINT};
pub use image::ImageWorkerConfig;
pub use network::NetworkDefinition;
pub use repository::RemoteRepository;
pub use watcher::ConfigWatcher;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/deviced.yaml";

/// The full daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DevicedConfig {
    /// Container sync worker settings.
    pub container_config: ContainerWorkerConfig,
    /// Image sync worker settings.
    pub image_config: ImageWorkerConfig,
    /// Engine connection settings.
    pub docker_config: DockerClientConfig,
    /// Remote repositories to pull from, in order.
    pub repos: Vec<RemoteRepository>,
    /// Desired containers.
    pub containers: Vec<TargetContainer>,
    /// Networks to ensure exist.
    pub networks: Vec<NetworkDefinition>,
}

impl DevicedConfig {
    /// Reads the configuration, writing a default file first if none
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, written, or parsed.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "writing default config");
            let config = Self::default();
            config.write_to(path)?;
            return Ok(config);
        }
        Self::read_from(path)
    }

    /// Reads and parses the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        info!(path = %path.display(), targets = config.containers.len(), "read config");
        Ok(config)
    }

    /// Serializes the configuration to the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}
