//! Architecture tag suffixing.
//!
//! On ARM hosts, image tags are expected to carry an `-arm` suffix so a
//! single target definition can serve mixed fleets.

/// Returns the tag suffix for the current host architecture.
///
/// `-arm` on ARM-family hosts, empty otherwise.
#[must_use]
pub fn arch_tag_suffix() -> &'static str {
    suffix_for(std::env::consts::ARCH)
}

/// The current host architecture string.
#[must_use]
pub fn current_arch() -> &'static str {
    std::env::consts::ARCH
}

fn suffix_for(arch: &str) -> &'static str {
    match arch {
        "arm" | "aarch64" => "-arm",
        _ => "",
    }
}

/// Appends the given suffix to every version tag.
///
/// Returns the list unchanged when the suffix is empty.
#[must_use]
pub fn append_suffix(versions: &[String], suffix: &str) -> Vec<String> {
    if suffix.is_empty() {
        return versions.to_vec();
    }
    versions.iter().map(|v| format!("{v}{suffix}")).collect()
}
