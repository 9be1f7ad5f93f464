//! Image sync worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default recheck period in seconds.
const DEFAULT_RECHECK_PERIOD: u64 = 60;

/// Configuration of the image sync worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageWorkerConfig {
    /// Seconds between spontaneous re-checks while requirements remain
    /// unsolved. `0` disables the periodic recheck.
    pub recheck_period: u64,
}

impl Default for ImageWorkerConfig {
    fn default() -> Self {
        Self {
            recheck_period: DEFAULT_RECHECK_PERIOD,
        }
    }
}

impl ImageWorkerConfig {
    /// The recheck timer duration, or `None` when disabled.
    #[must_use]
    pub fn recheck_delay(&self) -> Option<Duration> {
        (self.recheck_period >= 1).then(|| Duration::from_secs(self.recheck_period))
    }
}
