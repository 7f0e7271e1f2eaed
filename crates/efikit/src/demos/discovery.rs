use alloc::format;
use anyhow::{Context, Result};
use efikit_config::RootConfiguration;
use eficore::discovery::{resolve_protocol, well_known_name};
use eficore::{Firmware, Status, status_of};
use log::info;

/// Count the handles of every configured protocol and open it on the first one.
pub fn run(firmware: &Firmware, config: &RootConfiguration) -> Result<()> {
    for name in &config.discovery.protocols {
        let protocol = resolve_protocol(name)?;
        let label = well_known_name(&protocol).unwrap_or(name.as_str());

        let handles = match firmware.locate_handles(&protocol) {
            Ok(handles) => handles,
            Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => {
                info!("{}: no handles", label);
                continue;
            }
            Err(error) => return Err(error),
        };
        info!("{}: {} handles", label, handles.len());

        // Opening by handle shows the interface is really there.
        if let Some(&first) = handles.handles().first() {
            let opened = firmware
                .open_protocol_raw(first, &protocol)
                .with_context(|| format!("unable to open {} on its first handle", label))?;
            info!("{}: first interface at {:p}", label, opened.interface());
            opened.close()?;
        }
    }
    Ok(())
}
