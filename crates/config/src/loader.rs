use crate::{RootConfiguration, latest_version};
use alloc::vec::Vec;
use anyhow::{Context, Result, bail};
use eficore::{Status, status_of};
use log::info;
use toml::Value;

/// Parse the configuration file `content` into a [RootConfiguration].
/// The version is checked before the rest of the file is interpreted.
pub fn load(content: &[u8]) -> Result<RootConfiguration> {
    let value: Value = toml::from_slice(content).context("unable to parse efikit config file")?;

    // A file without a version is taken to be written for this build.
    let version = match value.get("version") {
        Some(version) => version.clone(),
        None => Value::Integer(latest_version().into()),
    };
    let version: u32 = version
        .try_into()
        .context("unable to get configuration version")?;
    if version != latest_version() {
        bail!("unsupported configuration version: {}", version);
    }

    value
        .try_into()
        .context("unable to parse efikit config file")
}

/// Load the configuration returned by `read`.
/// A `read` failing with [Status::NOT_FOUND] means there is no file, and the defaults apply.
pub fn load_or_default(read: impl FnOnce() -> Result<Vec<u8>>) -> Result<RootConfiguration> {
    match read() {
        Ok(content) => load(&content),
        Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => {
            info!("configuration file not found, using defaults");
            Ok(RootConfiguration::default())
        }
        Err(error) => Err(error).context("unable to read efikit config file"),
    }
}
