use anyhow::{Context, Result};
use core::fmt;
use log::warn;
use uefi_raw::Status;

/// An error status returned by firmware, or inserted by a local check.
///
/// The status is carried unchanged so that callers can inspect it after it has
/// travelled through any number of [anyhow] context layers, see [status_of].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusError {
    /// The status code with the high bit set.
    status: Status,
}

impl StatusError {
    /// Wrap the `status` as an error.
    pub const fn new(status: Status) -> Self {
        Self { status }
    }

    /// The underlying firmware status.
    pub const fn status(&self) -> Status {
        self.status
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "efi status {:?} ({:#x})", self.status, self.status.0)
    }
}

impl core::error::Error for StatusError {}

impl From<Status> for StatusError {
    fn from(status: Status) -> Self {
        Self::new(status)
    }
}

/// Translate a firmware `status` into a [Result].
///
/// Statuses with the high bit set are errors. Non-zero statuses with the high bit
/// clear are warnings: the call completed, so they are logged and treated as success.
pub fn check(status: Status) -> core::result::Result<(), StatusError> {
    if status.is_error() {
        return Err(StatusError::new(status));
    }

    // Warnings still mean the operation completed.
    if status != Status::SUCCESS {
        warn!("firmware returned warning status {:?}", status);
    }
    Ok(())
}

/// Produce an [anyhow::Error] for a locally detected failure with the given `status`.
pub fn fail(status: Status, message: &'static str) -> anyhow::Error {
    anyhow::Error::new(StatusError::new(status)).context(message)
}

/// Recover the firmware status carried by `error`, if any.
pub fn status_of(error: &anyhow::Error) -> Option<Status> {
    error
        .downcast_ref::<StatusError>()
        .map(|error| error.status())
}

/// Unwrap a function-pointer `slot` of a firmware table.
/// Empty slots are reported as [Status::UNSUPPORTED] instead of being called.
pub fn require<F>(slot: Option<F>, name: &'static str) -> Result<F> {
    slot.ok_or(StatusError::new(Status::UNSUPPORTED))
        .with_context(|| alloc::format!("firmware table does not provide {}", name))
}
