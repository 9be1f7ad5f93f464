//! Shared test doubles and fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerSummary, EndpointSettings, HostConfig,
    ImageSummary, Network,
};
use bollard::network::CreateNetworkOptions;
use deviced_core::config::TargetContainer;
use deviced_core::daemon::SharedState;
use deviced_core::DevicedConfig;
use deviced_engine::{
    ContainerEngine, EngineError, EventStream, ExecOutputStream, Result as EngineResult,
};
use deviced_registry::{
    RegistryAuth, RegistryError, RegistryProvider, Result as RegistryResult, TagLister,
};

/// A recorded container creation.
#[derive(Debug, Clone)]
pub struct CreatedContainer {
    pub name: String,
    pub config: ContainerConfig,
    pub host_config: HostConfig,
}

/// Mutable world state of the fake engine, plus recorded calls.
#[derive(Default)]
pub struct FakeEngineState {
    pub containers: Vec<ContainerSummary>,
    pub images: Vec<ImageSummary>,
    pub networks: Vec<Network>,

    pub created: Vec<CreatedContainer>,
    pub created_networks: Vec<String>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub removed: Vec<String>,
    pub pulled: Vec<(String, String)>,
    pub tagged: Vec<(String, String, String)>,
    pub execs: Vec<(String, Vec<String>)>,

    /// `(image, tag)` pairs whose pull should fail.
    pub pull_errors: HashSet<(String, String)>,

    /// Passes observed: the container worker lists containers once per pass.
    pub list_containers_calls: u32,
    /// One-shot hook: raise this signal `n` times from inside the next
    /// container listing, i.e. mid-pass.
    pub wake_during_list: Option<(deviced_core::wake::WakeSignal, u32)>,

    next_id: u32,
}

/// In-memory engine fake; records every mutating call.
#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<FakeEngineState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ping(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn list_containers(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> EngineResult<Vec<ContainerSummary>> {
        let mut state = self.state.lock().unwrap();
        state.list_containers_calls += 1;
        if let Some((signal, count)) = state.wake_during_list.take() {
            for _ in 0..count {
                signal.raise();
            }
        }
        let mut result = state.containers.clone();
        if let Some(label_filters) = filters.get("label") {
            for needle in label_filters {
                result.retain(|c| {
                    let labels = c.labels.clone().unwrap_or_default();
                    match needle.split_once('=') {
                        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
                        None => labels.contains_key(needle),
                    }
                });
            }
        }
        Ok(result)
    }

    async fn list_images(&self) -> EngineResult<Vec<ImageSummary>> {
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerInspectResponse> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .iter()
            .find(|c| {
                c.id.as_deref()
                    .is_some_and(|full| full == id || full.starts_with(id))
            })
            .map(|c| ContainerInspectResponse {
                id: c.id.clone(),
                ..Default::default()
            })
            .ok_or_else(|| EngineError::Other(format!("no such container: {id}")))
    }

    async fn list_networks(&self) -> EngineResult<Vec<Network>> {
        Ok(self.state.lock().unwrap().networks.clone())
    }

    async fn create_network(&self, options: CreateNetworkOptions<String>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.created_networks.push(options.name.clone());
        state.networks.push(Network {
            name: Some(options.name.clone()),
            id: Some(format!("net-{}", options.name)),
            ..Default::default()
        });
        Ok(())
    }

    async fn inspect_network(&self, id: &str) -> EngineResult<Network> {
        let state = self.state.lock().unwrap();
        state
            .networks
            .iter()
            .find(|n| n.name.as_deref() == Some(id) || n.id.as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| EngineError::Other(format!("no such network: {id}")))
    }

    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig,
        host_config: HostConfig,
        _networking_config: HashMap<String, EndpointSettings>,
    ) -> EngineResult<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("created-{}", state.next_id);
        state.created.push(CreatedContainer {
            name: name.to_string(),
            config,
            host_config,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.state.lock().unwrap().started.push(id.to_string());
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace_secs: i64) -> EngineResult<()> {
        self.state.lock().unwrap().stopped.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> EngineResult<()> {
        self.state.lock().unwrap().removed.push(id.to_string());
        Ok(())
    }

    async fn create_exec(&self, id: &str, cmd: Vec<String>, _tty: bool) -> EngineResult<String> {
        let mut state = self.state.lock().unwrap();
        state.execs.push((id.to_string(), cmd));
        Ok(format!("exec-{}", state.execs.len()))
    }

    async fn start_exec(&self, _exec_id: &str) -> EngineResult<ExecOutputStream> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn pull_image(
        &self,
        image: &str,
        tag: &str,
        _credentials: Option<DockerCredentials>,
    ) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let key = (image.to_string(), tag.to_string());
        if state.pull_errors.contains(&key) {
            return Err(EngineError::Other(format!("cannot pull {image}:{tag}")));
        }
        state.pulled.push(key);
        Ok(())
    }

    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> EngineResult<()> {
        self.state.lock().unwrap().tagged.push((
            source.to_string(),
            repo.to_string(),
            tag.to_string(),
        ));
        Ok(())
    }

    fn events(&self) -> EventStream {
        Box::pin(futures::stream::pending())
    }
}

/// Registry fake: endpoint -> repository -> tags.
#[derive(Default)]
pub struct FakeRegistry {
    pub tags: Mutex<HashMap<String, HashMap<String, Vec<String>>>>,
    pub unreachable: Mutex<HashSet<String>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn offer(&self, endpoint: &str, repository: &str, tags: &[&str]) {
        self.tags
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .insert(
                repository.to_string(),
                tags.iter().map(ToString::to_string).collect(),
            );
    }

    pub fn mark_unreachable(&self, endpoint: &str) {
        self.unreachable
            .lock()
            .unwrap()
            .insert(endpoint.to_string());
    }
}

struct FakeSession {
    repo_tags: HashMap<String, Vec<String>>,
}

#[async_trait]
impl TagLister for FakeSession {
    async fn list_tags(&self, repository: &str) -> RegistryResult<Vec<String>> {
        self.repo_tags
            .get(repository)
            .cloned()
            .ok_or_else(|| RegistryError::Registry(format!("repository {repository} not found")))
    }
}

#[async_trait]
impl RegistryProvider for FakeRegistry {
    async fn open_session(
        &self,
        endpoint: &str,
        _insecure: bool,
        _auth: Option<RegistryAuth>,
        _headers: &HashMap<String, String>,
    ) -> RegistryResult<Box<dyn TagLister>> {
        if self.unreachable.lock().unwrap().contains(endpoint) {
            return Err(RegistryError::Registry(format!("{endpoint} unreachable")));
        }
        let repo_tags = self
            .tags
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(FakeSession { repo_tags }))
    }
}

/// A running engine container labeled for the given target.
pub fn running(id: &str, target_id: &str, image: &str) -> ContainerSummary {
    container(id, target_id, image, "running")
}

/// An exited engine container labeled for the given target.
pub fn exited(id: &str, target_id: &str, image: &str) -> ContainerSummary {
    container(id, target_id, image, "exited")
}

fn container(id: &str, target_id: &str, image: &str, state: &str) -> ContainerSummary {
    ContainerSummary {
        id: Some(id.to_string()),
        names: Some(vec![format!("/devd_{target_id}_0")]),
        image: Some(image.to_string()),
        state: Some(state.to_string()),
        labels: Some(HashMap::from([(
            "deviced.id".to_string(),
            target_id.to_string(),
        )])),
        ..Default::default()
    }
}

/// A local image with the given repo tags.
pub fn local_image(repo_tags: &[&str]) -> ImageSummary {
    ImageSummary {
        repo_tags: repo_tags.iter().map(ToString::to_string).collect(),
        ..Default::default()
    }
}

/// A minimal target.
pub fn target(id: &str, image: &str, versions: &[&str]) -> TargetContainer {
    TargetContainer {
        id: id.to_string(),
        image: image.to_string(),
        versions: versions.iter().map(ToString::to_string).collect(),
        ..Default::default()
    }
}

/// Shared state over a fake engine and the given config.
pub fn shared_with(engine: Arc<FakeEngine>, config: DevicedConfig) -> Arc<SharedState> {
    Arc::new(SharedState::new(config, engine))
}
