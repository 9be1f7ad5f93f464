//! Target container definitions and version scoring.

use std::collections::HashMap;
use std::time::Duration;

use bollard::models::{ContainerConfig, EndpointSettings, HostConfig};
use serde::{Deserialize, Serialize};

use crate::arch;

/// Sentinel score for a tag outside the preferred list.
///
/// Any score below this is an index into the preferred list; lower is
/// better.
pub const UNACCEPTABLE_SCORE: u32 = u16::MAX as u32;

/// Default grace for on-stop exec hooks.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// One desired container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetContainer {
    /// Unique ID within the configuration; stored on managed containers as
    /// the `deviced.id` label.
    pub id: String,
    /// Repository-qualified image name without tag, e.g. `acme/web`.
    pub image: String,
    /// Acceptable version tags, most preferred first.
    pub versions: Vec<String>,
    /// Accept any tag offered by a configured repository as a fallback.
    pub use_any_version: bool,
    /// Suppress the ARM architecture tag suffix.
    pub no_arch_tag: bool,
    /// Restart stopped containers for this target instead of removing them.
    pub restart_exited: bool,
    /// Engine create parameters, passed through verbatim.
    pub docker_config: ContainerConfig,
    /// Engine host configuration, passed through verbatim.
    pub docker_host_config: HostConfig,
    /// Engine networking configuration, passed through verbatim.
    pub docker_networking_config: TargetNetworkingConfig,
    /// Hooks run around lifecycle transitions.
    pub lifecycle_hooks: LifecycleHookSet,
}

/// Per-network endpoint configuration for container creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetNetworkingConfig {
    /// Endpoint configs keyed by network name.
    #[serde(rename = "EndpointsConfig")]
    pub endpoints_config: HashMap<String, EndpointSettings>,
}

/// Lifecycle hooks of a target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleHookSet {
    /// Hooks run inside the container before it is stopped, in order.
    pub on_stop: Vec<LifecycleHook>,
}

/// A single lifecycle hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleHook {
    /// Command executed inside the container.
    pub exec: Option<LifecycleExecHook>,
}

/// An exec-style lifecycle hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifecycleExecHook {
    /// Command vector.
    pub command: Vec<String>,
    /// Wait duration, e.g. `45s` or `2m`. Defaults to 30 s when empty or
    /// unparseable.
    pub timeout: String,
}

impl LifecycleExecHook {
    /// The hook's wait duration.
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        if self.timeout.is_empty() {
            return DEFAULT_HOOK_TIMEOUT;
        }
        humantime::parse_duration(&self.timeout).unwrap_or(DEFAULT_HOOK_TIMEOUT)
    }
}

impl TargetContainer {
    /// The preferred tag list with the host's architecture suffix applied.
    #[must_use]
    pub fn preferred_tags(&self) -> Vec<String> {
        self.preferred_tags_with_suffix(arch::arch_tag_suffix())
    }

    /// The preferred tag list with an explicit architecture suffix.
    #[must_use]
    pub fn preferred_tags_with_suffix(&self, suffix: &str) -> Vec<String> {
        if self.no_arch_tag {
            self.versions.clone()
        } else {
            arch::append_suffix(&self.versions, suffix)
        }
    }

    /// Scores a concrete tag against the preferred list.
    ///
    /// Returns the zero-based index of the first case-insensitive match, or
    /// [`UNACCEPTABLE_SCORE`] when the tag is not acceptable.
    #[must_use]
    pub fn version_score(&self, tag: &str) -> u32 {
        self.version_score_with_suffix(tag, arch::arch_tag_suffix())
    }

    /// Scores a tag with an explicit architecture suffix.
    #[must_use]
    pub fn version_score_with_suffix(&self, tag: &str, suffix: &str) -> u32 {
        self.preferred_tags_with_suffix(suffix)
            .iter()
            .position(|v| v.eq_ignore_ascii_case(tag))
            .and_then(|idx| u32::try_from(idx).ok())
            .unwrap_or(UNACCEPTABLE_SCORE)
    }

    /// Whether this target can never be satisfied: no preferred versions
    /// and no any-version fallback.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.versions.is_empty() && !self.use_any_version
    }
}

/// Configuration of the container sync worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerWorkerConfig {
    /// Allow the daemon to delete the container it runs in.
    pub allow_self_delete: bool,
}
