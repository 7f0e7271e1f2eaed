use anyhow::{Context, Result};
use core::fmt::Write;
use eficore::Firmware;
use eficore::firmware::InputKey;
use log::info;
use uefi::proto::console::text::Color;

/// Reset the console and print the header and firmware details.
pub fn banner(firmware: &Firmware) -> Result<()> {
    uefi::system::with_stdout(|stdout| -> Result<()> {
        stdout.reset(false).context("unable to reset console")?;
        stdout.clear().context("unable to clear console")?;
        stdout
            .set_color(Color::White, Color::Blue)
            .context("unable to set console color")?;
        writeln!(stdout, "efikit firmware protocol demo")?;
        writeln!(stdout, "-----------------------------")?;
        stdout
            .set_color(Color::LightGray, Color::Black)
            .context("unable to set console color")?;
        Ok(())
    })?;

    let revision = firmware.firmware_revision();
    info!(
        "firmware: {} {}.{:02}",
        firmware.firmware_vendor().as_deref().unwrap_or("unknown"),
        revision >> 16,
        revision & 0xffff
    );
    Ok(())
}

/// Print `message` highlighted and wait for a key.
pub fn pause(firmware: &Firmware, message: &str) -> Result<InputKey> {
    uefi::system::with_stdout(|stdout| -> Result<()> {
        stdout
            .set_color(Color::LightGreen, Color::Black)
            .context("unable to set console color")?;
        writeln!(stdout, "{}", message)?;
        stdout
            .set_color(Color::LightGray, Color::Black)
            .context("unable to set console color")?;
        Ok(())
    })?;
    eficore::console::wait_for_key(firmware)
}

/// Clear the screen and bring the cursor back, e.g. after drawing with graphics output.
pub fn text_mode() -> Result<()> {
    uefi::system::with_stdout(|stdout| -> Result<()> {
        stdout.clear().context("unable to clear console")?;
        stdout
            .enable_cursor(true)
            .context("unable to enable cursor")?;
        Ok(())
    })
}

/// Clear the screen and say goodbye.
pub fn farewell() -> Result<()> {
    uefi::system::with_stdout(|stdout| -> Result<()> {
        stdout.clear().context("unable to clear console")?;
        writeln!(stdout, "Exiting efikit...")?;
        Ok(())
    })
}
