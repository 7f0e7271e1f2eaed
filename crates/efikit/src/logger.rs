//! Based on: https://github.com/rust-osdev/uefi-rs/blob/main/uefi/src/helpers/logger.rs

use alloc::format;
use anyhow::{Result, anyhow};
use core::fmt::Write;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use log::{LevelFilter, Log, Record};
use uefi::proto::console::text::Output;

/// The global logger object.
static LOGGER: Logger = Logger::new();

/// Logging mechanism for efikit.
/// Nothing is printed until an output is set, as the output is held in an atomic pointer.
pub struct Logger {
    writer: AtomicPtr<Output>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Create a logger without an output.
    pub const fn new() -> Self {
        Self {
            writer: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The output to write to. May be null.
    #[must_use]
    fn output(&self) -> *mut Output {
        self.writer.load(Ordering::Acquire)
    }

    /// Sets the output to write to.
    ///
    /// # Safety
    /// The output must stay valid for as long as the logger is in use.
    pub unsafe fn set_output(&self, output: *mut Output) {
        self.writer.store(output, Ordering::Release);
    }
}

impl Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    /// Write `record` to the output, one line at a time.
    fn log(&self, record: &Record) {
        // SAFETY: The output is either null or the console set in [init].
        let Some(output) = (unsafe { self.output().as_mut() }) else {
            return;
        };

        let message = format!("{}", record.args());
        for line in message.lines() {
            // Every line carries the level, so multi-line messages stay readable.
            let _ = writeln!(output, "[{:>5}] {}", record.level(), line);
        }
    }

    fn flush(&self) {}
}

/// Install the console logger.
pub fn init() -> Result<()> {
    uefi::system::with_stdout(|stdout| unsafe {
        // SAFETY: The console output is global and outlives the application.
        LOGGER.set_output(stdout);
    });

    log::set_logger(&LOGGER).map_err(|error| anyhow!("unable to set logger: {}", error))?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

/// Show debug output, which includes every firmware call the wrappers trace.
pub fn set_verbose(verbose: bool) {
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}
