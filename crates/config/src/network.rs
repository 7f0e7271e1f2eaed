use crate::enabled;
use serde::{Deserialize, Serialize};

/// The configuration of the network demonstration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NetworkConfiguration {
    /// Whether to run the demonstration.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Whether to bring the interface up before reporting on it.
    #[serde(default = "enabled")]
    pub initialize: bool,
    /// Whether to print the interface counters.
    #[serde(default)]
    pub statistics: bool,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            initialize: true,
            statistics: false,
        }
    }
}
