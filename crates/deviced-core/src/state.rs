//! In-memory reconciliation state.

use bollard::models::ContainerSummary;

use crate::config::TargetContainer;
use crate::images;

/// The container currently chosen to satisfy one target.
///
/// Rebuilt from the engine listing on every reconciliation pass; holds only
/// copies of engine identifiers.
#[derive(Debug, Clone)]
pub struct RunningContainer {
    /// The target this container satisfies.
    pub deviced_id: String,
    /// Image name without tag.
    pub image: String,
    /// Image tag.
    pub image_tag: String,
    /// Engine container ID; `None` for a planned replacement that has not
    /// been created yet.
    pub container_id: Option<String>,
    /// Preference score of `image_tag` for the target.
    pub score: u32,
}

impl RunningContainer {
    /// Builds the snapshot for an existing engine container.
    #[must_use]
    pub fn from_summary(summary: &ContainerSummary, target: &TargetContainer, score: u32) -> Self {
        let reported = summary.image.clone().unwrap_or_default();
        let (image, image_tag) = images::split_image_tag(&reported);
        Self {
            deviced_id: target.id.clone(),
            image,
            image_tag,
            container_id: summary.id.clone(),
            score,
        }
    }

    /// Builds the snapshot for a planned replacement at the given tag.
    #[must_use]
    pub fn planned(target: &TargetContainer, tag: &str, score: u32) -> Self {
        Self {
            deviced_id: target.id.clone(),
            image: target.image.clone(),
            image_tag: tag.to_string(),
            container_id: None,
            score,
        }
    }
}
