//! # deviced-registry
//!
//! Docker Registry v2 client, scoped to what the image sync worker needs:
//! opening a per-endpoint session with credentials and extra headers, and
//! listing a repository's tags. Pulls themselves go through the container
//! engine, which speaks to the registry with its own machinery.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub mod client;
pub mod error;

pub use client::{RegistryAuth, RegistrySession};
pub use error::{RegistryError, Result};

/// Lists tags of repositories within one open registry session.
#[async_trait]
pub trait TagLister: Send + Sync {
    /// Lists all tags of a repository.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>>;
}

/// Opens sessions against remote registries.
///
/// The daemon holds one provider; tests substitute fakes.
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Opens a session for one registry endpoint.
    async fn open_session(
        &self,
        endpoint: &str,
        insecure: bool,
        auth: Option<RegistryAuth>,
        headers: &HashMap<String, String>,
    ) -> Result<Box<dyn TagLister>>;
}

/// Shared provider trait object.
pub type DynRegistryProvider = Arc<dyn RegistryProvider>;

/// Provider backed by the Registry v2 HTTP client.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpRegistryProvider;

#[async_trait]
impl RegistryProvider for HttpRegistryProvider {
    async fn open_session(
        &self,
        endpoint: &str,
        insecure: bool,
        auth: Option<RegistryAuth>,
        headers: &HashMap<String, String>,
    ) -> Result<Box<dyn TagLister>> {
        let session = RegistrySession::open(endpoint, insecure, auth, headers)?;
        Ok(Box::new(session))
    }
}

/// Normalizes an image name for registry API paths.
///
/// Unqualified single-segment names are namespaced under `library/`, the
/// registry convention for official images.
#[must_use]
pub fn normalize_image_name(image: &str) -> String {
    if image.contains('/') {
        image.to_string()
    } else {
        format!("library/{image}")
    }
}
