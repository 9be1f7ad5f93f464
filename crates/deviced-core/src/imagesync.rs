//! Image sync worker.
//!
//! Watches the configured remote repositories for tags the targets prefer
//! over what is locally present, pulls the best reachable one per target,
//! and wakes the container sync worker when new images land. While any
//! target remains short of its top preference, a recheck timer re-runs the
//! pass periodically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deviced_registry::{normalize_image_name, DynRegistryProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UNACCEPTABLE_SCORE;
use crate::daemon::SharedState;
use crate::images;
use crate::wake::{WakeReceiver, WakeSignal};

/// One target's outstanding image requirements for this pass.
struct FetchEntry {
    /// Image name as configured.
    image: String,
    /// Tags strictly better than the best local one, preference order.
    needed: Vec<String>,
    /// Tag to indices into `config.repos` offering it.
    available_at: HashMap<String, Vec<usize>>,
}

/// Reconciles locally available images against target preferences.
pub struct ImageSyncWorker {
    shared: Arc<SharedState>,
    registry: DynRegistryProvider,
    wake: WakeReceiver,
    /// Raised by the supervisor when timer parameters may have changed;
    /// re-arms the recheck timer without running a pass.
    rearm: WakeReceiver,
    container_wake: WakeSignal,
    shutdown: CancellationToken,
    unsolved_requirements: bool,
}

impl ImageSyncWorker {
    /// Creates the worker.
    #[must_use]
    pub fn new(
        shared: Arc<SharedState>,
        registry: DynRegistryProvider,
        wake: WakeReceiver,
        rearm: WakeReceiver,
        container_wake: WakeSignal,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared,
            registry,
            wake,
            rearm,
            container_wake,
            shutdown,
            unsolved_requirements: false,
        }
    }

    /// Whether the last pass left any target short of its top preference.
    #[must_use]
    pub fn has_unsolved_requirements(&self) -> bool {
        self.unsolved_requirements
    }

    /// Runs the worker until shutdown.
    pub async fn run(mut self) {
        info!("image sync worker started");
        let mut force = true;
        let mut rearm_open = true;
        loop {
            if !force {
                let delay = self.recheck_delay().await;
                debug!("image sync worker sleeping");
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    woken = self.wake.recv() => {
                        if !woken {
                            break;
                        }
                        debug!("image sync worker woken");
                    }
                    raised = self.rearm.recv(), if rearm_open => {
                        // Timer parameters changed; re-read them next round.
                        rearm_open = raised;
                        continue;
                    }
                    () = sleep_or_never(delay) => {
                        debug!("recheck timer elapsed");
                    }
                }
            }
            force = false;
            self.process_once().await;
        }
        info!("image sync worker exiting");
    }

    /// The current recheck timer, disabled while nothing is unsolved.
    async fn recheck_delay(&self) -> Option<Duration> {
        if !self.unsolved_requirements {
            return None;
        }
        let config = self.shared.config.lock().await;
        config.image_config.recheck_delay()
    }

    /// Runs one reconciliation pass under the configuration and worker
    /// locks.
    pub async fn process_once(&mut self) {
        let shared = Arc::clone(&self.shared);
        let config = shared.config.lock().await;
        let _pass = shared.worker_lock.lock().await;
        self.unsolved_requirements = false;

        debug!("image sync worker checking repositories");
        if config.repos.is_empty() {
            debug!("no repositories configured");
            return;
        }

        let engine = shared.engine.as_ref();
        let images = match engine.list_images().await {
            Ok(images) => images,
            Err(err) => {
                warn!(error = %err, "cannot list local images");
                return;
            }
        };
        let image_map = images::build_image_map(&images);

        // Work out which tags each target still wants: everything strictly
        // better than the best locally available score.
        let mut fetch_set: Vec<FetchEntry> = Vec::new();
        for target in &config.containers {
            if target.is_inert() {
                continue;
            }
            let local_tags = image_map
                .get(&target.image)
                .map_or(&[][..], Vec::as_slice);
            let best_local = local_tags
                .iter()
                .map(|tag| target.version_score(tag))
                .filter(|score| *score < UNACCEPTABLE_SCORE)
                .min();
            if best_local == Some(0) {
                continue;
            }
            let preferred = target.preferred_tags();
            let needed: Vec<String> = match best_local {
                None => preferred,
                Some(score) => preferred.into_iter().take(score as usize).collect(),
            };
            debug!(
                image = %target.image,
                best_local = ?best_local,
                needed = ?needed,
                any_version = target.use_any_version,
                "target needs better images"
            );
            fetch_set.push(FetchEntry {
                image: target.image.clone(),
                needed,
                available_at: HashMap::new(),
            });
        }

        if fetch_set.is_empty() {
            return;
        }
        info!(targets = fetch_set.len(), "probing repositories");

        // Probe every repository for every outstanding image.
        for (repo_idx, repo) in config.repos.iter().enumerate() {
            if !repo.validate() {
                warn!("skipping repository with empty url");
                continue;
            }
            let session = match self
                .registry
                .open_session(&repo.url, repo.insecure, repo.registry_auth(), &repo.meta_headers)
                .await
            {
                Ok(session) => session,
                Err(err) => {
                    warn!(url = %repo.url, error = %err, "cannot open registry session");
                    continue;
                }
            };
            for entry in &mut fetch_set {
                let name = normalize_image_name(&entry.image);
                match session.list_tags(&name).await {
                    Ok(tags) => {
                        debug!(
                            url = %repo.url,
                            image = %entry.image,
                            tags = tags.len(),
                            pull_prefix = %repo.pull_prefix,
                            "repository offers tags"
                        );
                        for tag in tags {
                            entry.available_at.entry(tag).or_default().push(repo_idx);
                        }
                    }
                    Err(err) => {
                        warn!(url = %repo.url, image = %entry.image, error = %err, "tag listing failed");
                    }
                }
            }
        }

        // Pull the first reachable tag per target, in preference order.
        let mut pulled_any = false;
        for entry in &fetch_set {
            let mut matched_one = false;
            let mut matched_best = false;
            'tags: for (idx, tag) in entry.needed.iter().enumerate() {
                let Some(repo_indices) = entry.available_at.get(tag) else {
                    continue;
                };
                for &repo_idx in repo_indices {
                    let repo = &config.repos[repo_idx];
                    let pull_name = repo.prefixed_image(&entry.image);
                    info!(image = %pull_name, tag = %tag, url = %repo.url, "pulling image");
                    if let Err(err) =
                        engine.pull_image(&pull_name, tag, repo.docker_credentials()).await
                    {
                        warn!(image = %pull_name, tag = %tag, error = %err, "pull failed");
                        continue;
                    }
                    if !repo.pull_prefix.is_empty() {
                        let source = format!("{pull_name}:{tag}");
                        if let Err(err) = engine.tag_image(&source, &entry.image, tag).await {
                            warn!(source = %source, error = %err, "retag failed");
                            continue;
                        }
                        debug!(source = %source, image = %entry.image, tag = %tag, "retagged");
                    }
                    pulled_any = true;
                    matched_one = true;
                    if idx == 0 {
                        matched_best = true;
                    }
                    break 'tags;
                }
            }
            if !matched_one || !matched_best {
                self.unsolved_requirements = true;
                debug!(image = %entry.image, "requirements unsolved, will recheck later");
            }
        }

        if pulled_any {
            self.container_wake.raise();
        }

        // A wake that arrived during the pass collapses into one re-run.
        self.wake.drain();
    }
}

/// Sleeps for the given delay, or forever when the timer is disabled.
async fn sleep_or_never(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}
