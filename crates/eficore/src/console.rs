use crate::firmware::{Firmware, InputKey};
use crate::status::{check, require};
use anyhow::{Context, Result};
use log::debug;
use uefi_raw::Status;

impl InputKey {
    /// The printable character of this key, if it has one.
    pub fn character(&self) -> Option<char> {
        if self.unicode_char == 0 {
            return None;
        }
        char::decode_utf16([self.unicode_char]).next()?.ok()
    }
}

/// Wait for a fresh keystroke on the console and return it.
///
/// Keystrokes already buffered are discarded first, so that a key pressed before the
/// call does not satisfy the wait.
pub fn wait_for_key(firmware: &Firmware) -> Result<InputKey> {
    let input = firmware.console_input()?;
    // SAFETY: The console input protocol lives as long as boot services.
    let table = unsafe { input.as_ref() };
    let read_key_stroke = require(table.read_key_stroke, "ReadKeyStroke")?;
    let wait_for_event = require(firmware.boot_services().wait_for_event, "WaitForEvent")?;

    let mut key = InputKey::default();

    // Drain everything that is already pending.
    let mut drained = 0usize;
    loop {
        // SAFETY: `key` is a valid out pointer.
        let status = unsafe { read_key_stroke(input.as_ptr(), &mut key) };
        if status == Status::NOT_READY {
            break;
        }
        check(status).context("unable to drain pending keystrokes")?;
        drained += 1;
    }
    if drained > 0 {
        debug!("discarded {} pending keystrokes", drained);
    }

    let mut events = [table.wait_for_key];
    let mut index = 0;
    // SAFETY: `events` holds one valid event and `index` is a valid out pointer.
    let status = unsafe { wait_for_event(events.len(), events.as_mut_ptr(), &mut index) };
    check(status).context("unable to wait for a keystroke")?;

    // SAFETY: `key` is a valid out pointer.
    let status = unsafe { read_key_stroke(input.as_ptr(), &mut key) };
    check(status).context("unable to read keystroke")?;
    Ok(key)
}
