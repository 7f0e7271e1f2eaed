//! efikit EFI core.
//! This crate provides typed wrappers over the protocol tables handed out by UEFI firmware:
//! protocol discovery, file I/O, graphics output and simple network access.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

/// Console input helpers.
pub mod console;

/// Protocol discovery: locating protocols and handles.
pub mod discovery;

/// File system wrappers over the simple file system and file protocols.
pub mod file;

/// The dispatch-table accessor and the firmware tables it reads.
pub mod firmware;

/// Graphics output protocol wrappers.
pub mod graphics;

/// Simple network protocol wrappers.
pub mod network;

/// Firmware pool allocation helpers.
pub mod pool;

/// Status translation between firmware status codes and [anyhow] errors.
pub mod status;

/// String utilities.
pub mod strings;

/// Fake firmware tables for host unit tests.
#[cfg(test)]
mod testing;

pub use firmware::{Firmware, firmware, install};
pub use status::{StatusError, check, status_of};
pub use uefi_raw::{Event, Guid, Handle, Status, guid};
