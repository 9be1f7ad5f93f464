//! Container sync worker.
//!
//! Compares the engine's `deviced.id`-labeled containers against the
//! configured targets and reconciles: duplicate containers are resolved by
//! version score, better-scored local images trigger replacement, unmatched
//! or dead containers are removed (after their on-stop hooks), and declared
//! networks are created up front so dependent containers can attach.
//!
//! The worker re-runs on wake signals and on relevant engine events,
//! batching event bursts with a short sleep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bollard::models::{
    ContainerConfig, EndpointSettings, EventMessage, EventMessageTypeEnum, HostConfig, Network,
};
use deviced_engine::EventStream;
use futures::{FutureExt, StreamExt};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DevicedConfig, LifecycleHook, TargetContainer, UNACCEPTABLE_SCORE};
use crate::daemon::SharedState;
use crate::images;
use crate::reflection::Reflection;
use crate::state::RunningContainer;
use crate::wake::WakeReceiver;

/// Label carrying the owning target's ID on every managed container.
pub const DEVICED_ID_LABEL: &str = "deviced.id";

/// Grace period passed to container stop.
const STOP_GRACE_SECS: i64 = 30;

/// Batch window after a relevant engine event before re-running.
const EVENT_BATCH_DELAY: Duration = Duration::from_secs(1);

/// Pause before resubscribing to a closed event stream.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// A planned container creation.
struct CreateRequest {
    name: String,
    config: ContainerConfig,
    host_config: HostConfig,
    networking: HashMap<String, EndpointSettings>,
}

/// Reconciles engine containers against the configured targets.
pub struct ContainerSyncWorker {
    shared: Arc<SharedState>,
    wake: WakeReceiver,
    reflection: Option<Reflection>,
    shutdown: CancellationToken,
}

impl ContainerSyncWorker {
    /// Creates the worker.
    #[must_use]
    pub fn new(
        shared: Arc<SharedState>,
        wake: WakeReceiver,
        reflection: Option<Reflection>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared,
            wake,
            reflection,
            shutdown,
        }
    }

    /// Runs the worker until shutdown.
    pub async fn run(mut self) {
        info!("container sync worker started");
        let mut events = self.shared.engine.events();
        loop {
            self.wake.drain();
            self.process_once().await;
            // Events caused by our own pass collapse into nothing.
            drain_pending_events(&mut events);

            debug!("container sync worker sleeping");
            loop {
                tokio::select! {
                    () = self.shutdown.cancelled() => {
                        info!("container sync worker exiting");
                        return;
                    }
                    woken = self.wake.recv() => {
                        if !woken {
                            info!("container sync worker exiting");
                            return;
                        }
                        debug!("container sync worker woken");
                        break;
                    }
                    event = events.next() => match event {
                        Some(Ok(message)) if is_relevant_event(&message) => {
                            debug!(event_type = ?message.typ, "engine event, batching");
                            tokio::time::sleep(EVENT_BATCH_DELAY).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "engine event stream error");
                        }
                        None => {
                            warn!("engine event stream closed, resubscribing");
                            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                            events = self.shared.engine.events();
                        }
                    },
                }
            }
        }
    }

    /// Runs one reconciliation pass under the configuration and worker
    /// locks.
    pub async fn process_once(&mut self) {
        let config = self.shared.config.lock().await;
        let _pass = self.shared.worker_lock.lock().await;

        let net_map = self.process_networks(&config).await;

        debug!("container sync worker checking containers");
        let engine = self.shared.engine.as_ref();
        let filters = HashMap::from([("label".to_string(), vec![DEVICED_ID_LABEL.to_string()])]);
        let containers = match engine.list_containers(filters).await {
            Ok(containers) => containers,
            Err(err) => {
                warn!(error = %err, "cannot list containers");
                return;
            }
        };
        let images = match engine.list_images().await {
            Ok(images) => images,
            Err(err) => {
                warn!(error = %err, "cannot list images");
                return;
            }
        };
        let image_map = images::build_image_map(&images);

        let mut current: HashMap<String, RunningContainer> = HashMap::new();
        let mut to_delete: HashMap<String, Vec<LifecycleHook>> = HashMap::new();
        let mut to_start: HashSet<String> = HashSet::new();
        let mut to_create: Vec<CreateRequest> = Vec::new();

        // Phase 1: match engine containers to targets, resolve duplicates.
        for summary in &containers {
            let Some(container_id) = summary.id.clone() else {
                continue;
            };
            let reported_image = summary.image.clone().unwrap_or_default();
            let (_, image_tag) = images::split_image_tag(&reported_image);
            let label = summary
                .labels
                .as_ref()
                .and_then(|labels| labels.get(DEVICED_ID_LABEL))
                .cloned()
                .unwrap_or_default();

            let target = config
                .containers
                .iter()
                .find(|t| t.id.eq_ignore_ascii_case(&label));
            let Some(target) = target else {
                info!(
                    container_id = %container_id,
                    image = %reported_image,
                    "no target for container, scheduling delete"
                );
                to_delete.insert(container_id, Vec::new());
                continue;
            };

            let state = summary.state.clone().unwrap_or_default();
            if state != "running" && !target.restart_exited {
                info!(
                    container_id = %container_id,
                    state = %state,
                    "container not running and restartExited unset, scheduling delete"
                );
                to_delete.insert(container_id, Vec::new());
                continue;
            }

            let score = target.version_score(&image_tag);
            let candidate = RunningContainer::from_summary(summary, target, score);
            match current.get(&target.id).cloned() {
                None => {
                    current.insert(target.id.clone(), candidate);
                }
                Some(existing) if score < existing.score => {
                    info!(
                        kept = %container_id,
                        dropped = ?existing.container_id,
                        "duplicate target, keeping better-scored container"
                    );
                    if let Some(old_id) = existing.container_id {
                        to_delete.insert(old_id, target.lifecycle_hooks.on_stop.clone());
                    }
                    to_start.insert(container_id);
                    current.insert(target.id.clone(), candidate);
                }
                Some(existing) => {
                    info!(
                        kept = ?existing.container_id,
                        dropped = %container_id,
                        "duplicate target, keeping better-scored container"
                    );
                    to_delete.insert(container_id, target.lifecycle_hooks.on_stop.clone());
                    if let Some(kept_id) = existing.container_id {
                        to_start.insert(kept_id);
                    }
                }
            }
        }

        // Phase 2: decide per target whether a better local image exists.
        for target in &config.containers {
            let current_entry = current.get(&target.id).cloned();
            if let Some(cur) = &current_entry {
                if cur.score == 0 {
                    continue;
                }
            }
            let Some(local_tags) = image_map.get(&target.image) else {
                debug!(image = %target.image, "no local tags yet");
                continue;
            };

            let mut best: Option<(String, u32)> = None;
            for tag in local_tags {
                let score = target.version_score(tag);
                if score == UNACCEPTABLE_SCORE && !target.use_any_version {
                    continue;
                }
                if let Some(cur) = &current_entry {
                    if *tag == cur.image_tag {
                        continue;
                    }
                    if score >= cur.score {
                        continue;
                    }
                }
                match &best {
                    Some((_, best_score)) if *best_score <= score => {}
                    _ => best = Some((tag.clone(), score)),
                }
            }

            let Some((tag, score)) = best else {
                if current_entry.is_none() {
                    debug!(image = %target.image, "no suitable image, skipping");
                }
                continue;
            };

            if let Some(cur) = &current_entry {
                info!(
                    from = %format!("{}:{}", cur.image, cur.image_tag),
                    to = %format!("{}:{}", target.image, tag),
                    "replacing container with better image"
                );
                if let Some(old_id) = cur.container_id.clone() {
                    to_delete.insert(old_id, target.lifecycle_hooks.on_stop.clone());
                }
            }
            info!(target = %target.id, image = %target.image, tag = %tag, "scheduling container");
            to_create.push(build_create_request(target, &tag));
            current.insert(target.id.clone(), RunningContainer::planned(target, &tag, score));
        }

        // A container superseded after being queued for start must not be
        // started back up.
        to_start.retain(|id| !to_delete.contains_key(id));

        // Phase 3: deletions, with self-protection and on-stop hooks.
        for (container_id, hooks) in &to_delete {
            if let Some(reflection) = &self.reflection {
                if reflection.is_self(container_id) {
                    if config.container_config.allow_self_delete {
                        info!(container_id = %container_id, "allowing self-deletion");
                    } else {
                        info!(container_id = %container_id, "preventing self-deletion");
                        continue;
                    }
                }
            }

            self.run_stop_hooks(container_id, hooks).await;

            info!(container_id = %container_id, "stopping container");
            if let Err(err) = engine.stop_container(container_id, STOP_GRACE_SECS).await {
                warn!(container_id = %container_id, error = %err, "cannot stop container");
            }
            if let Err(err) = engine.remove_container(container_id, true).await {
                warn!(container_id = %container_id, error = %err, "cannot remove container");
            }
        }

        // Phase 4: creations (gated on network availability), then starts.
        for request in to_create {
            if let Some(mode) = request.host_config.network_mode.as_deref() {
                if !mode.is_empty() {
                    let name = network_name(mode);
                    if !name.is_empty() && !net_map.contains_key(name) {
                        warn!(
                            network = %mode,
                            name = %request.name,
                            "network not available, skipping creation"
                        );
                        continue;
                    }
                }
            }
            match engine
                .create_container(
                    &request.name,
                    request.config,
                    request.host_config,
                    request.networking,
                )
                .await
            {
                Ok(id) => {
                    to_start.insert(id);
                }
                Err(err) => {
                    warn!(name = %request.name, error = %err, "container creation failed");
                }
            }
        }

        for container_id in &to_start {
            if let Err(err) = engine.start_container(container_id).await {
                if !err.is_already_started() {
                    warn!(container_id = %container_id, error = %err, "container start failed");
                }
            }
        }
    }

    /// Ensures declared networks exist; returns the reconciled map by name.
    ///
    /// Failures are logged and leave the network absent from the map, which
    /// later gates dependent container creations.
    async fn process_networks(&self, config: &DevicedConfig) -> HashMap<String, Network> {
        debug!("container sync worker checking networks");
        let engine = self.shared.engine.as_ref();
        let mut net_map = HashMap::new();

        let list = match engine.list_networks().await {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "cannot list networks");
                return net_map;
            }
        };
        for network in list {
            if let Some(name) = network.name.clone() {
                net_map.insert(name, network);
            }
        }

        for definition in &config.networks {
            if definition.name.is_empty() {
                warn!("ignoring network definition with empty name");
                continue;
            }
            if net_map.contains_key(&definition.name) {
                continue;
            }
            info!(name = %definition.name, "creating network");
            if let Err(err) = engine.create_network(definition.to_create_options()).await {
                warn!(name = %definition.name, error = %err, "cannot create network");
                continue;
            }
            match engine.inspect_network(&definition.name).await {
                Ok(resource) => {
                    net_map.insert(definition.name.clone(), resource);
                }
                Err(err) => {
                    warn!(name = %definition.name, error = %err, "cannot inspect created network");
                    net_map.insert(
                        definition.name.clone(),
                        Network {
                            name: Some(definition.name.clone()),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        net_map
    }

    /// Runs a container's on-stop hooks in order. Hook errors are logged
    /// and non-fatal; a hook that exceeds its timeout is cancelled by
    /// dropping its output stream.
    async fn run_stop_hooks(&self, container_id: &str, hooks: &[LifecycleHook]) {
        let engine = self.shared.engine.as_ref();
        for (idx, hook) in hooks.iter().enumerate() {
            let Some(exec) = &hook.exec else {
                continue;
            };
            debug!(container_id, hook = idx, command = ?exec.command, "running stop hook");
            let exec_id = match engine
                .create_exec(container_id, exec.command.clone(), true)
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    warn!(container_id, hook = idx, error = %err, "cannot create stop hook exec");
                    continue;
                }
            };
            let mut output = match engine.start_exec(&exec_id).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(container_id, hook = idx, error = %err, "cannot attach stop hook exec");
                    continue;
                }
            };

            // The stream must be read to completion or the engine may block
            // on a full buffer.
            let drain = async {
                while let Some(chunk) = output.next().await {
                    if let Err(err) = chunk {
                        warn!(container_id, hook = idx, error = %err, "stop hook output error");
                        break;
                    }
                }
            };
            if tokio::time::timeout(exec.timeout_duration(), drain)
                .await
                .is_err()
            {
                warn!(container_id, hook = idx, "stop hook timed out, continuing");
            }
        }
    }
}

/// Builds the engine create request for a target at the chosen tag.
fn build_create_request(target: &TargetContainer, tag: &str) -> CreateRequest {
    let mut config = target.docker_config.clone();
    config.image = Some(format!("{}:{tag}", target.image));
    config
        .labels
        .get_or_insert_with(HashMap::new)
        .insert(DEVICED_ID_LABEL.to_string(), target.id.clone());
    CreateRequest {
        name: format!("devd_{}_{}", target.id, rand::thread_rng().gen_range(0..100)),
        config,
        host_config: target.docker_host_config.clone(),
        networking: target.docker_networking_config.endpoints_config.clone(),
    }
}

/// Resolves a host-config network mode to the network name it depends on.
///
/// Returns an empty string for modes that do not reference a listable
/// network (`container:<id>` attachments).
#[must_use]
pub fn network_name(mode: &str) -> &str {
    match mode {
        "default" => "bridge",
        m if m.starts_with("container:") => "",
        m => m,
    }
}

/// Whether an engine event should trigger a reconciliation pass.
fn is_relevant_event(message: &EventMessage) -> bool {
    matches!(
        message.typ,
        Some(EventMessageTypeEnum::CONTAINER)
            | Some(EventMessageTypeEnum::IMAGE)
            | Some(EventMessageTypeEnum::NETWORK)
    )
}

/// Consumes any events that piled up during a pass without waiting.
fn drain_pending_events(events: &mut EventStream) {
    while let Some(Some(_)) = events.next().now_or_never() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_name_extractor() {
        assert_eq!(network_name("default"), "bridge");
        assert_eq!(network_name("bridge"), "bridge");
        assert_eq!(network_name("host"), "host");
        assert_eq!(network_name("custom"), "custom");
        assert_eq!(network_name("container:abc123"), "");
    }

    #[test]
    fn test_relevant_events() {
        let event = |typ| EventMessage {
            typ: Some(typ),
            ..Default::default()
        };
        assert!(is_relevant_event(&event(EventMessageTypeEnum::CONTAINER)));
        assert!(is_relevant_event(&event(EventMessageTypeEnum::IMAGE)));
        assert!(is_relevant_event(&event(EventMessageTypeEnum::NETWORK)));
        assert!(!is_relevant_event(&event(EventMessageTypeEnum::VOLUME)));
        assert!(!is_relevant_event(&EventMessage::default()));
    }

    #[test]
    fn test_create_request_labels_and_image() {
        let target = TargetContainer {
            id: "web".to_string(),
            image: "acme/web".to_string(),
            versions: vec!["v2".to_string()],
            ..Default::default()
        };
        let request = build_create_request(&target, "v2");
        assert!(request.name.starts_with("devd_web_"));
        assert_eq!(request.config.image.as_deref(), Some("acme/web:v2"));
        assert_eq!(
            request.config.labels.as_ref().unwrap()[DEVICED_ID_LABEL],
            "web"
        );
    }
}
