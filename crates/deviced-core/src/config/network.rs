//! Declared network definitions.

use std::collections::HashMap;

use bollard::network::CreateNetworkOptions;
use serde::{Deserialize, Serialize};

/// A network the daemon ensures exists before creating containers in it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkDefinition {
    /// Network name; entries with an empty name are ignored.
    pub name: String,
    /// Network driver; empty means the engine default.
    pub driver: String,
    /// Driver options, passed through.
    pub options: HashMap<String, String>,
    /// Labels, passed through.
    pub labels: HashMap<String, String>,
    /// Restrict external access.
    pub internal: bool,
    /// Allow manual container attachment.
    pub attachable: bool,
}

impl NetworkDefinition {
    /// The engine create request for this definition.
    #[must_use]
    pub fn to_create_options(&self) -> CreateNetworkOptions<String> {
        CreateNetworkOptions {
            name: self.name.clone(),
            driver: self.driver.clone(),
            options: self.options.clone(),
            labels: self.labels.clone(),
            internal: self.internal,
            attachable: self.attachable,
            ..Default::default()
        }
    }
}
