use alloc::string::String;
use anyhow::{Context, Result};
use efikit_config::RootConfiguration;
use eficore::file::{File, FileAttributes, FileMode, open_root_volume};
use eficore::{Firmware, Status, status_of};
use log::info;

/// Remove a leftover file from an earlier run. A missing file is fine.
fn remove_existing(root: &File<'_>, path: &str) -> Result<()> {
    match root.open(path, FileMode::READ | FileMode::WRITE, FileAttributes::empty()) {
        Ok(existing) => existing
            .delete()
            .context("unable to delete the previous demo file"),
        Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => Ok(()),
        Err(error) => Err(error),
    }
}

/// Write the configured file on the boot volume, read it back, show the volume and list the root.
pub fn run(firmware: &Firmware, config: &RootConfiguration) -> Result<()> {
    let path = config.file.path.as_str();
    let mut root = open_root_volume(firmware).context("unable to open the boot volume")?;

    remove_existing(&root, path)?;

    let mut file = root
        .open(
            path,
            FileMode::READ | FileMode::WRITE | FileMode::CREATE,
            FileAttributes::empty(),
        )
        .context("unable to create the demo file")?;
    let written = file
        .write(config.file.content.as_bytes())
        .context("unable to write the demo file")?;
    file.flush()?;
    file.close()?;
    info!("wrote {} bytes to {}", written, path);

    let mut file = root
        .open(path, FileMode::READ, FileAttributes::empty())
        .context("unable to reopen the demo file")?;
    let content = file.read_to_end()?;
    info!("read back: {}", String::from_utf8_lossy(&content));
    let size = file.info()?.header().file_size;
    info!("file size reported by firmware: {} bytes", size);
    file.close()?;

    let volume = root.volume_info()?;
    let header = volume.header();
    info!(
        "volume '{}': {} bytes, {} free, block size {}{}",
        volume.name(),
        header.volume_size,
        header.free_space,
        header.block_size,
        if header.read_only != 0 { ", read-only" } else { "" }
    );

    if config.file.list_root {
        info!("root directory:");
        for entry in root.entries() {
            let entry = entry.context("unable to read the root directory")?;
            let header = entry.header();
            if header.is_directory() {
                info!("  {}/", entry.name());
            } else {
                info!("  {} ({} bytes)", entry.name(), header.file_size);
            }
        }
    }

    root.close()
}
