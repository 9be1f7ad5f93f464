//! Remote image repository configuration.

use std::collections::HashMap;

use bollard::auth::DockerCredentials;
use deviced_registry::RegistryAuth;
use serde::{Deserialize, Serialize};

/// A remote registry the image sync worker may pull from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteRepository {
    /// Registry endpoint URL; the scheme may be omitted.
    pub url: String,
    /// Prefix prepended to image names on pull and retagged off afterwards.
    pub pull_prefix: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Extra headers sent with every registry request.
    pub meta_headers: HashMap<String, String>,
    /// Skip TLS verification / allow plain HTTP for this endpoint.
    pub insecure: bool,
}

impl RemoteRepository {
    /// Whether credentials are configured.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        !self.username.is_empty()
    }

    /// Whether the entry is usable at all.
    #[must_use]
    pub fn validate(&self) -> bool {
        !self.url.is_empty()
    }

    /// Credentials for the registry session, if configured.
    #[must_use]
    pub fn registry_auth(&self) -> Option<RegistryAuth> {
        self.requires_auth().then(|| RegistryAuth {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    /// Credentials in the engine's pull format, if configured.
    #[must_use]
    pub fn docker_credentials(&self) -> Option<DockerCredentials> {
        self.requires_auth().then(|| DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            ..Default::default()
        })
    }

    /// The name to pull, with the pull prefix applied.
    #[must_use]
    pub fn prefixed_image(&self, image: &str) -> String {
        if self.pull_prefix.is_empty() {
            image.to_string()
        } else {
            format!("{}/{image}", self.pull_prefix)
        }
    }
}
