//! efikit configuration.
//! This crate holds the serde model of `efikit.toml` and its versioned loader.
//! It does not depend on UEFI so that it can be tested on any host.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

use serde::{Deserialize, Serialize};

/// Configuration for the protocol discovery demonstration.
pub mod discovery;

/// Configuration for the file system demonstration.
pub mod file;

/// Configuration for the graphics demonstration.
pub mod graphics;

/// Loading and version checking of the configuration file.
pub mod loader;

/// Configuration for the network demonstration.
pub mod network;

/// Selecting and running the configured demonstrations.
pub mod runner;

pub use loader::{load, load_or_default};

/// The configuration version this build understands.
pub const LATEST_VERSION: u32 = 1;

/// Serde default for the configuration version.
pub const fn latest_version() -> u32 {
    LATEST_VERSION
}

/// The root of the efikit configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RootConfiguration {
    /// The configuration format version.
    #[serde(default = "latest_version")]
    pub version: u32,
    /// Whether to wait for a keypress before exiting.
    #[serde(default = "enabled")]
    pub pause: bool,
    /// The file system demonstration.
    #[serde(default)]
    pub file: file::FileConfiguration,
    /// The network demonstration.
    #[serde(default)]
    pub network: network::NetworkConfiguration,
    /// The graphics demonstration.
    #[serde(default)]
    pub graphics: graphics::GraphicsConfiguration,
    /// The protocol discovery demonstration.
    #[serde(default)]
    pub discovery: discovery::DiscoveryConfiguration,
}

impl Default for RootConfiguration {
    fn default() -> Self {
        Self {
            version: latest_version(),
            pause: true,
            file: Default::default(),
            network: Default::default(),
            graphics: Default::default(),
            discovery: Default::default(),
        }
    }
}

/// Serde default for switches that are on unless configured otherwise.
pub(crate) const fn enabled() -> bool {
    true
}
