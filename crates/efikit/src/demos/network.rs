use anyhow::{Context, Result};
use efikit_config::RootConfiguration;
use eficore::network::SimpleNetwork;
use eficore::{Firmware, Status, status_of};
use log::info;

/// Bring up the first network interface and print its address, state and media.
/// A machine without a network interface is not a failure.
pub fn run(firmware: &Firmware, config: &RootConfiguration) -> Result<()> {
    let mut network = match SimpleNetwork::locate(firmware) {
        Ok(network) => network,
        Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => {
            info!("no network interface found");
            return Ok(());
        }
        Err(error) => return Err(error),
    };

    if config.network.initialize {
        network
            .initialize()
            .context("unable to initialize the network interface")?;
    }

    let address = network.current_address()?;
    let size = network.address_size()?;
    info!("mac address: {}", address.display(size));
    info!("state: {}", network.state()?);
    match network.media_present()? {
        Some(true) => info!("media: present"),
        Some(false) => info!("media: not present"),
        None => info!("media: unknown"),
    }

    if config.network.statistics {
        let statistics = network
            .statistics(false)
            .context("unable to read interface statistics")?;
        info!(
            "received {} frames ({} bytes), sent {} frames ({} bytes)",
            statistics.rx_total_frames,
            statistics.rx_total_bytes,
            statistics.tx_total_frames,
            statistics.tx_total_bytes
        );
    }

    Ok(())
}
