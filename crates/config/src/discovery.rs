use crate::enabled;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// The configuration of the protocol discovery demonstration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiscoveryConfiguration {
    /// Whether to run the demonstration.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Protocols to count handles for, by well-known name or GUID.
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
}

fn default_protocols() -> Vec<String> {
    vec!["block-io".to_string()]
}

impl Default for DiscoveryConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            protocols: default_protocols(),
        }
    }
}
