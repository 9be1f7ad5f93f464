//! Local image inventory helpers.

use std::collections::HashMap;

use bollard::models::ImageSummary;

/// Placeholder the engine reports for dangling image references.
const NONE_PLACEHOLDER: &str = "<none>";

/// Default tag when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Builds a map of image name to locally available tags.
///
/// Repo-tags containing the `<none>` placeholder are skipped. The tag
/// lists may contain duplicates; consumers treat them as sets.
#[must_use]
pub fn build_image_map(images: &[ImageSummary]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for image in images {
        for repo_tag in &image.repo_tags {
            if repo_tag.contains(NONE_PLACEHOLDER) {
                continue;
            }
            let (name, tag) = split_image_tag(repo_tag);
            map.entry(name).or_default().push(tag);
        }
    }
    map
}

/// Splits an image reference into name and tag on the last `:`.
///
/// A reference without a tag separator gets the default tag. A `:` that is
/// part of a registry port (followed by a `/`) does not count as a
/// separator.
#[must_use]
pub fn split_image_tag(reference: &str) -> (String, String) {
    match reference.rfind(':') {
        Some(idx) if !reference[idx + 1..].contains('/') => (
            reference[..idx].to_string(),
            reference[idx + 1..].to_string(),
        ),
        _ => (reference.to_string(), DEFAULT_TAG.to_string()),
    }
}
