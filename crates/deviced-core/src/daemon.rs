//! Daemon supervisor.
//!
//! Owns the configuration, the engine handle, and both sync workers.
//! Reloads the configuration when the file changes and shuts everything
//! down cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deviced_engine::DynContainerEngine;
use deviced_registry::{DynRegistryProvider, HttpRegistryProvider};
use tokio::signal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::arch;
use crate::config::{ConfigWatcher, DevicedConfig};
use crate::containersync::ContainerSyncWorker;
use crate::error::Result;
use crate::imagesync::ImageSyncWorker;
use crate::reflection;
use crate::wake::wake_channel;

/// Debounce between a config file event and the re-read, so editors that
/// write in several steps are seen once.
const DEBOUNCE_DELAY: Duration = Duration::from_secs(1);

/// State shared between the supervisor and both workers.
///
/// Lock order is always `config` then `worker_lock`; `worker_lock` ensures
/// at most one reconciliation pass mutates the engine at a time.
pub struct SharedState {
    /// The live configuration; replaced wholesale on reload.
    pub config: Mutex<DevicedConfig>,
    /// Mutual exclusion between reconciliation passes.
    pub worker_lock: Mutex<()>,
    /// The container engine.
    pub engine: DynContainerEngine,
}

impl SharedState {
    /// Creates shared state around a configuration and engine.
    #[must_use]
    pub fn new(config: DevicedConfig, engine: DynContainerEngine) -> Self {
        Self {
            config: Mutex::new(config),
            worker_lock: Mutex::new(()),
            engine,
        }
    }
}

/// The daemon: configuration, engine, and both workers.
pub struct System {
    config_path: PathBuf,
}

impl System {
    /// Creates a daemon reading configuration from the given path.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Runs the daemon until a termination signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error on startup failure: unreadable configuration,
    /// unreachable engine, or a watcher that cannot be established.
    pub async fn run(&self) -> Result<()> {
        let config = DevicedConfig::load_or_init(&self.config_path)?;
        let engine: DynContainerEngine = Arc::new(config.docker_config.build_engine()?);
        engine.ping().await?;
        info!("engine is reachable");

        let suffix = arch::arch_tag_suffix();
        if suffix.is_empty() {
            info!(arch = arch::current_arch(), "using no arch tag suffix");
        } else {
            info!(suffix, "using arch tag suffix");
        }

        let reflection = reflection::resolve_self(engine.as_ref()).await;

        let shared = Arc::new(SharedState::new(config, engine));
        let shutdown = CancellationToken::new();
        let (container_wake, container_wake_rx) = wake_channel();
        let (image_wake, image_wake_rx) = wake_channel();
        let (image_rearm, image_rearm_rx) = wake_channel();

        let container_worker = ContainerSyncWorker::new(
            Arc::clone(&shared),
            container_wake_rx,
            reflection,
            shutdown.child_token(),
        );
        let registry: DynRegistryProvider = Arc::new(HttpRegistryProvider);
        let image_worker = ImageSyncWorker::new(
            Arc::clone(&shared),
            registry,
            image_wake_rx,
            image_rearm_rx,
            container_wake.clone(),
            shutdown.child_token(),
        );

        info!("starting workers");
        let image_task = tokio::spawn(image_worker.run());
        let container_task = tokio::spawn(container_worker.run());

        let mut watcher = Some(ConfigWatcher::new(&self.config_path)?);

        let shutdown_wait = shutdown_signal();
        tokio::pin!(shutdown_wait);
        loop {
            tokio::select! {
                () = &mut shutdown_wait => {
                    info!("shutdown signal received");
                    break;
                }
                () = watch_changed(&mut watcher) => {
                    debug!("config file event");
                    // The watch is rebuilt after the re-read; editors often
                    // replace the file, invalidating the old watch.
                    watcher = None;
                    tokio::time::sleep(DEBOUNCE_DELAY).await;

                    match DevicedConfig::read_from(&self.config_path) {
                        Ok(new_config) => {
                            *shared.config.lock().await = new_config;
                            info!("config reloaded, waking workers");
                            image_rearm.raise();
                            image_wake.raise();
                            container_wake.raise();
                        }
                        Err(err) => {
                            warn!(error = %err, "cannot re-read config, keeping previous");
                        }
                    }

                    match ConfigWatcher::new(&self.config_path) {
                        Ok(rebuilt) => watcher = Some(rebuilt),
                        Err(err) => {
                            warn!(error = %err, "cannot re-open config watcher");
                        }
                    }
                }
            }
        }

        shutdown.cancel();
        drop(watcher);
        let _ = image_task.await;
        let _ = container_task.await;
        info!("deviced stopped");
        Ok(())
    }
}

/// Resolves when the config watcher reports a change. Pends forever when no
/// watcher is active; resolves when the backend dies so the caller rebuilds
/// it.
async fn watch_changed(watcher: &mut Option<ConfigWatcher>) {
    match watcher {
        Some(active) => {
            active.changed().await;
        }
        None => std::future::pending().await,
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
