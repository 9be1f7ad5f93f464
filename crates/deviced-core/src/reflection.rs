//! Self-identification against the engine.
//!
//! Resolves which engine container, if any, is running this daemon. Works
//! because a container's default hostname is the truncated container ID;
//! under host networking the hostname is the host's and the inspect simply
//! fails, which disables self-protection.

use deviced_engine::ContainerEngine;
use tracing::{info, warn};

/// The daemon's own engine-side identity.
#[derive(Debug, Clone)]
pub struct Reflection {
    /// Full ID of the container this daemon runs in.
    pub container_id: String,
}

impl Reflection {
    /// Whether the given container is this daemon.
    #[must_use]
    pub fn is_self(&self, container_id: &str) -> bool {
        self.container_id == container_id
    }
}

/// Resolves the daemon's own container by inspecting the hostname.
///
/// Best-effort: any failure is logged once and yields `None`.
pub async fn resolve_self(engine: &dyn ContainerEngine) -> Option<Reflection> {
    let hostname = match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!(error = %err, "cannot read hostname, continuing without reflection");
            return None;
        }
    };

    match engine.inspect_container(&hostname).await {
        Ok(inspected) => match inspected.id {
            Some(container_id) => {
                info!(container_id = %container_id, "located our own container");
                Some(Reflection { container_id })
            }
            None => {
                warn!("self inspect returned no ID, continuing without reflection");
                None
            }
        },
        Err(err) => {
            warn!(hostname = %hostname, error = %err, "cannot locate our own container, continuing without reflection");
            None
        }
    }
}
