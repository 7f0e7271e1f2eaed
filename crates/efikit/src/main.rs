//! efikit: a UEFI application that demonstrates the eficore protocol wrappers.
//! It writes and reads a file on the boot volume, shows the network interface,
//! draws with graphics output and counts protocol handles.

#![no_std]
#![no_main]
extern crate alloc;

use crate::options::EfikitOptions;
use anyhow::{Context, Result};
use core::time::Duration;
use eficore::{Firmware, status_of};
use log::{error, info, warn};
use uefi::{Status, entry};

/// The delay to wait for when an error occurs in efikit.
const DELAY_ON_ERROR: Duration = Duration::from_secs(10);

/// config: Locate and load the efikit configuration file.
pub mod config;

/// console: Console text output helpers.
pub mod console;

/// demos: The demonstrations efikit runs.
pub mod demos;

/// env: Access to the command line passed to efikit.
pub mod env;

/// logger: Route log records to the console.
pub mod logger;

/// options: Parse the options of the efikit executable.
pub mod options;

/// setup: Code that initializes the UEFI environment for efikit.
pub mod setup;

/// Run efikit, returning an error if one occurs.
fn run(firmware: &Firmware) -> Result<()> {
    let options = EfikitOptions::parse().context("unable to parse options")?;
    logger::set_verbose(options.verbose);

    console::banner(firmware)?;

    let config = config::load(firmware, &options).context("unable to load configuration")?;

    let failures = efikit_config::runner::run_all(
        firmware,
        demos::DEMOS,
        &config,
        options.demo.as_deref(),
    )?;
    if failures > 0 {
        warn!("{} demos failed", failures);
    } else {
        info!("all demos finished");
    }

    if config.pause {
        console::pause(firmware, "Press any key to exit...")?;
    }
    console::farewell()
}

#[entry]
fn main() -> Status {
    // Initialize the basic UEFI environment.
    let firmware = match setup::init() {
        Ok(firmware) => firmware,
        Err(error) => {
            error!("unable to set up efikit: {:#}", error);
            return status_of(&error).unwrap_or(Status::ABORTED);
        }
    };

    let result = run(firmware);
    if let Err(ref error) = result {
        // Print an error trace.
        error!("efikit encountered an error");
        for (index, stack) in error.chain().enumerate() {
            error!("[{}]: {}", index, stack);
        }
        // Sleep to allow the user to read the error.
        uefi::boot::stall(DELAY_ON_ERROR);
        return status_of(error).unwrap_or(Status::ABORTED);
    }

    Status::SUCCESS
}
