use crate::logger;
use anyhow::{Context, Result};
use eficore::Firmware;

/// Initializes the UEFI environment and installs the firmware tables for the wrappers.
pub fn init() -> Result<&'static Firmware> {
    // Initialize the uefi internals.
    uefi::helpers::init().context("unable to initialize uefi")?;

    // Route log output to the console.
    logger::init()?;

    // Hand the raw tables to the wrappers in eficore.
    let system_table =
        uefi::table::system_table_raw().context("system table is not available")?;
    let image = uefi::boot::image_handle();

    // SAFETY: The system table comes straight from the entry point and stays valid
    // until boot services are exited, which efikit never does.
    unsafe { eficore::install(image.as_ptr(), system_table.as_ptr().cast()) }
        .context("unable to install firmware tables")
}
