use crate::enabled;
use alloc::string::{String, ToString};
use serde::{Deserialize, Serialize};

/// Default name of the file written and read back by the demonstration.
pub const DEFAULT_PATH: &str = "efikit-demo.txt";

/// Default content written to the demonstration file.
pub const DEFAULT_CONTENT: &str = "Hello from efikit!";

/// The configuration of the file system demonstration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileConfiguration {
    /// Whether to run the demonstration.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// The file to create, relative to the root of the first volume.
    #[serde(default = "default_path")]
    pub path: String,
    /// The text to write into the file.
    #[serde(default = "default_content")]
    pub content: String,
    /// Whether to list the root directory afterwards.
    #[serde(default = "enabled", rename = "list-root")]
    pub list_root: bool,
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_content() -> String {
    DEFAULT_CONTENT.to_string()
}

impl Default for FileConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_path(),
            content: default_content(),
            list_root: true,
        }
    }
}
