//! # deviced-engine
//!
//! Capability interface over the local container engine.
//!
//! The reconciliation workers never talk to a concrete client; they go
//! through [`ContainerEngine`], which covers the operations the daemon
//! needs (container lifecycle, images, networks, exec, the event stream).
//! [`DockerEngine`] implements the trait over a bollard client; tests
//! substitute fakes.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::LogOutput;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, EventMessage,
    HostConfig, ImageSummary, Network,
};
use bollard::network::CreateNetworkOptions;
use futures::Stream;

pub mod docker;
pub mod error;

pub use docker::DockerEngine;
pub use error::{EngineError, Result};

/// Stream of engine events, as produced by the engine's `/events` endpoint.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventMessage>> + Send>>;

/// Output stream of an attached exec instance.
pub type ExecOutputStream = Pin<Box<dyn Stream<Item = Result<LogOutput>> + Send>>;

/// Shared engine trait object.
pub type DynContainerEngine = Arc<dyn ContainerEngine>;

/// Container engine abstraction.
///
/// Mirrors the subset of the engine API the daemon drives. The engine
/// client is concurrency-safe; callers serialize reconciliation passes
/// themselves.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Verifies the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Lists containers matching the given filters, including stopped ones.
    async fn list_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>>;

    /// Lists all local images.
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Inspects a single container by ID or name.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse>;

    /// Lists all networks.
    async fn list_networks(&self) -> Result<Vec<Network>>;

    /// Creates a network. Callers resolve the resulting resource by
    /// inspecting it by name.
    async fn create_network(&self, options: CreateNetworkOptions<String>) -> Result<()>;

    /// Inspects a network by ID or name.
    async fn inspect_network(&self, id: &str) -> Result<Network>;

    /// Creates a container, returning its ID.
    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig,
        host_config: HostConfig,
        networking_config: HashMap<String, EndpointSettings>,
    ) -> Result<String>;

    /// Starts a container. Starting an already-running container yields an
    /// error classified by [`EngineError::is_already_started`].
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stops a container with the given grace period in seconds.
    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<()>;

    /// Removes a container.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Creates an exec instance inside a running container, returning the
    /// exec ID.
    async fn create_exec(&self, id: &str, cmd: Vec<String>, tty: bool) -> Result<String>;

    /// Attaches to an exec instance and returns its output stream. Dropping
    /// the stream aborts the underlying request.
    async fn start_exec(&self, exec_id: &str) -> Result<ExecOutputStream>;

    /// Pulls `image:tag`, draining the progress stream to completion.
    async fn pull_image(
        &self,
        image: &str,
        tag: &str,
        credentials: Option<DockerCredentials>,
    ) -> Result<()>;

    /// Tags `source` (an `image:tag` or ID) as `repo:tag`, overwriting any
    /// existing tag.
    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> Result<()>;

    /// Subscribes to the engine event stream. Dropping the stream cancels
    /// the subscription.
    fn events(&self) -> EventStream;
}
