use crate::options::EfikitOptions;
use alloc::vec::Vec;
use anyhow::Result;
use efikit_config::RootConfiguration;
use eficore::Firmware;
use eficore::file::{FileAttributes, FileMode, open_root_volume};
use log::info;

/// Reads the configuration file at `path` from the first file system volume.
fn read_config(firmware: &Firmware, path: &str) -> Result<Vec<u8>> {
    let root = open_root_volume(firmware)?;
    let mut file = root.open(path, FileMode::READ, FileAttributes::empty())?;
    file.read_to_end()
}

/// Loads the [RootConfiguration] for efikit.
/// A missing configuration file is not an error: the defaults apply.
pub fn load(firmware: &Firmware, options: &EfikitOptions) -> Result<RootConfiguration> {
    if options.defaults {
        info!("using the default configuration");
        return Ok(RootConfiguration::default());
    }

    info!("configuration file: {}", options.config);
    efikit_config::load_or_default(|| read_config(firmware, &options.config))
}
