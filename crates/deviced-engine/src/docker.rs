//! Docker implementation of the engine interface.
//!
//! Thin forwarding layer over a bollard client; the only logic here is
//! stream adaptation and progress draining for pulls.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions, TagImageOptions};
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, HostConfig,
    ImageSummary, Network,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions, ListNetworksOptions};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::trace;

use crate::error::{EngineError, Result};
use crate::{ContainerEngine, EventStream, ExecOutputStream};

/// Container engine backed by a local Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Wraps an already-connected bollard client.
    #[must_use]
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn list_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers)
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await?;
        Ok(images)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        Ok(self.docker.inspect_container(id, None).await?)
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?)
    }

    async fn create_network(&self, options: CreateNetworkOptions<String>) -> Result<()> {
        self.docker.create_network(options).await?;
        Ok(())
    }

    async fn inspect_network(&self, id: &str) -> Result<Network> {
        Ok(self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await?)
    }

    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig,
        host_config: HostConfig,
        networking_config: HashMap<String, EndpointSettings>,
    ) -> Result<String> {
        let mut create: Config<String> = config.into();
        create.host_config = Some(host_config);
        if !networking_config.is_empty() {
            create.networking_config = Some(NetworkingConfig {
                endpoints_config: networking_config,
            });
        }
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                create,
            )
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_secs }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn create_exec(&self, id: &str, cmd: Vec<String>, tty: bool) -> Result<String> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    tty: Some(tty),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<ExecOutputStream> {
        match self.docker.start_exec(exec_id, None).await? {
            StartExecResults::Attached { output, .. } => {
                Ok(Box::pin(output.map(|item| item.map_err(EngineError::from))))
            }
            StartExecResults::Detached => {
                Err(EngineError::Other("exec started detached".to_string()))
            }
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        tag: &str,
        credentials: Option<DockerCredentials>,
    ) -> Result<()> {
        let mut progress = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                tag: tag.to_string(),
                ..Default::default()
            }),
            None,
            credentials,
        );
        while let Some(step) = progress.next().await {
            let info = step?;
            if let Some(err) = info.error {
                return Err(EngineError::Other(err));
            }
            trace!(image, tag, status = ?info.status, "pull progress");
        }
        Ok(())
    }

    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> Result<()> {
        self.docker
            .tag_image(
                source,
                Some(TagImageOptions {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    fn events(&self) -> EventStream {
        let stream = self
            .docker
            .events(None::<EventsOptions<String>>)
            .map(|item| item.map_err(EngineError::from));
        Box::pin(stream)
    }
}
