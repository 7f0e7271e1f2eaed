use crate::file::SimpleFileSystemProtocol;
use crate::firmware::{Firmware, OpenProtocolAttributes, SearchType};
use crate::graphics::GraphicsOutputProtocol;
use crate::network::SimpleNetworkProtocol;
use crate::pool::{PoolBuffer, fetch_with_retry};
use crate::status::{StatusError, check, fail, require, status_of};
use alloc::format;
use anyhow::{Context, Result};
use core::ffi::c_void;
use core::marker::PhantomData;
use core::mem::{ManuallyDrop, size_of};
use core::ptr::{self, NonNull};
use log::{debug, error};
use uefi_raw::{Guid, Handle, Status, guid};

/// A firmware protocol table identified by a GUID.
pub trait Protocol {
    /// The GUID the firmware publishes the protocol under.
    const GUID: Guid;
}

/// The block I/O protocol. Only its GUID is needed, for handle discovery.
pub const BLOCK_IO_PROTOCOL: Guid = guid!("964e5b21-6459-11d2-8e39-00a0c969723b");

/// Protocols that can be referred to by name.
pub const WELL_KNOWN_PROTOCOLS: &[(&str, Guid)] = &[
    ("block-io", BLOCK_IO_PROTOCOL),
    ("simple-file-system", SimpleFileSystemProtocol::GUID),
    ("graphics-output", GraphicsOutputProtocol::GUID),
    ("simple-network", SimpleNetworkProtocol::GUID),
];

/// Look up a well-known protocol GUID by `name`.
pub fn well_known(name: &str) -> Option<Guid> {
    WELL_KNOWN_PROTOCOLS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, guid)| *guid)
}

/// Look up the name of a well-known `protocol`.
pub fn well_known_name(protocol: &Guid) -> Option<&'static str> {
    WELL_KNOWN_PROTOCOLS
        .iter()
        .find(|(_, guid)| guid == protocol)
        .map(|(name, _)| *name)
}

/// Resolve `name_or_guid`, which is either a well-known protocol name or a GUID string.
pub fn resolve_protocol(name_or_guid: &str) -> Result<Guid> {
    if let Some(guid) = well_known(name_or_guid) {
        return Ok(guid);
    }

    name_or_guid
        .parse::<Guid>()
        .map_err(|_| fail(Status::INVALID_PARAMETER, "not a protocol name or guid"))
        .with_context(|| format!("unable to resolve protocol '{}'", name_or_guid))
}

/// Handles returned by LocateHandle, held in a pool buffer.
pub struct HandleBuffer<'fw> {
    /// The pool buffer holding the handles, absent when there are none.
    buffer: Option<PoolBuffer<'fw>>,
    /// The number of handles in the buffer.
    count: usize,
}

impl HandleBuffer<'_> {
    /// The located handles.
    pub fn handles(&self) -> &[Handle] {
        match &self.buffer {
            // SAFETY: Pool allocations are 8-byte aligned and the firmware filled `count` handles.
            Some(buffer) => unsafe {
                core::slice::from_raw_parts(buffer.as_ptr().cast::<Handle>(), self.count)
            },
            None => &[],
        }
    }

    /// The number of located handles.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no handles were located.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A protocol opened on a handle with the running image as agent.
/// The protocol is closed when this value is dropped.
pub struct OpenedProtocol<'fw, P> {
    /// The firmware the protocol was opened through.
    firmware: &'fw Firmware,
    /// The handle the protocol is installed on.
    handle: Handle,
    /// The protocol GUID.
    protocol: Guid,
    /// The protocol interface.
    interface: NonNull<P>,
}

impl<'fw, P> OpenedProtocol<'fw, P> {
    /// The handle the protocol was opened on.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The protocol interface.
    pub fn interface(&self) -> NonNull<P> {
        self.interface
    }

    /// Close the protocol now, reporting any failure.
    pub fn close(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        this.firmware.close_protocol(this.handle, &this.protocol)
    }
}

impl<P> Drop for OpenedProtocol<'_, P> {
    fn drop(&mut self) {
        if let Err(error) = self.firmware.close_protocol(self.handle, &self.protocol) {
            error!("unable to close protocol {}: {:#}", self.protocol, error);
        }
    }
}

impl Firmware {
    /// Locate the first interface for `protocol`.
    pub fn locate_protocol(&self, protocol: &Guid) -> Result<NonNull<c_void>> {
        let locate = require(self.boot_services().locate_protocol, "LocateProtocol")?;

        let mut interface = ptr::null_mut();
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe { locate(protocol, ptr::null_mut(), &mut interface) };
        check(status).with_context(|| format!("unable to locate protocol {}", protocol))?;

        debug!("located protocol {}", protocol);
        NonNull::new(interface)
            .ok_or(StatusError::new(Status::NOT_FOUND))
            .with_context(|| format!("firmware returned a null interface for {}", protocol))
    }

    /// Locate the first instance of protocol `P`.
    pub fn locate<P: Protocol>(&self) -> Result<NonNull<P>> {
        Ok(self.locate_protocol(&P::GUID)?.cast())
    }

    /// Locate every handle that supports `protocol`.
    pub fn locate_handles(&self, protocol: &Guid) -> Result<HandleBuffer<'_>> {
        let locate = require(self.boot_services().locate_handle, "LocateHandle")?;

        // Probe for the size, allocate, then fetch.
        let fetched = fetch_with_retry(self, 0, |size, buffer| {
            // SAFETY: `size` and `buffer` describe memory owned by fetch_with_retry.
            unsafe {
                locate(
                    SearchType::BY_PROTOCOL,
                    protocol,
                    ptr::null_mut(),
                    size,
                    buffer.cast(),
                )
            }
        })
        .with_context(|| format!("unable to locate handles for protocol {}", protocol))?;

        let count = fetched.size / size_of::<Handle>();
        debug!("located {} handles for protocol {}", count, protocol);
        Ok(HandleBuffer {
            buffer: fetched.buffer,
            count,
        })
    }

    /// Find a handle that provides `protocol`, if there is one.
    pub fn find_handle(&self, protocol: &Guid) -> Result<Option<Handle>> {
        match self.locate_handles(protocol) {
            Ok(handles) => Ok(handles.handles().first().copied()),
            // Not finding the protocol is an answer, not a failure.
            Err(error) if status_of(&error) == Some(Status::NOT_FOUND) => Ok(None),
            Err(error) => Err(error).context("unable to determine if the protocol is available"),
        }
    }

    /// Open `protocol` on `handle` by handle protocol, with the running image as agent.
    pub fn open_protocol_raw(
        &self,
        handle: Handle,
        protocol: &Guid,
    ) -> Result<OpenedProtocol<'_, c_void>> {
        if handle.is_null() {
            return Err(fail(Status::INVALID_PARAMETER, "handle is null"));
        }

        let open = require(self.boot_services().open_protocol, "OpenProtocol")?;

        let mut interface = ptr::null_mut();
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe {
            open(
                handle,
                protocol,
                &mut interface,
                self.image_handle(),
                ptr::null_mut(),
                OpenProtocolAttributes::BY_HANDLE_PROTOCOL,
            )
        };
        check(status).with_context(|| format!("unable to open protocol {}", protocol))?;

        let Some(interface) = NonNull::new(interface) else {
            // The open succeeded, so it has to be undone before reporting the null interface.
            if let Err(error) = self.close_protocol(handle, protocol) {
                error!("unable to close protocol {}: {:#}", protocol, error);
            }
            return Err(StatusError::new(Status::UNSUPPORTED))
                .with_context(|| format!("firmware returned a null interface for {}", protocol));
        };

        Ok(OpenedProtocol {
            firmware: self,
            handle,
            protocol: *protocol,
            interface,
        })
    }

    /// Open protocol `P` on `handle`.
    pub fn open_protocol<P: Protocol>(&self, handle: Handle) -> Result<OpenedProtocol<'_, P>> {
        let opened = ManuallyDrop::new(self.open_protocol_raw(handle, &P::GUID)?);
        Ok(OpenedProtocol {
            firmware: opened.firmware,
            handle: opened.handle,
            protocol: opened.protocol,
            interface: opened.interface.cast(),
        })
    }

    /// Close `protocol` on `handle` that was opened with the running image as agent.
    pub fn close_protocol(&self, handle: Handle, protocol: &Guid) -> Result<()> {
        if handle.is_null() {
            return Err(fail(Status::INVALID_PARAMETER, "handle is null"));
        }

        let close = require(self.boot_services().close_protocol, "CloseProtocol")?;
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe { close(handle, protocol, self.image_handle(), ptr::null_mut()) };
        check(status).with_context(|| format!("unable to close protocol {}", protocol))?;
        Ok(())
    }
}

/// Ties a typed protocol pointer to the firmware it came from.
/// Wrapper types hold one of these to keep the firmware borrowed while they live.
pub(crate) struct Interface<'fw, P> {
    /// The firmware the interface was located through.
    pub firmware: &'fw Firmware,
    /// The protocol table.
    pub raw: NonNull<P>,
    _marker: PhantomData<&'fw P>,
}

impl<'fw, P> Interface<'fw, P> {
    /// Wrap `raw`, located through `firmware`.
    pub fn new(firmware: &'fw Firmware, raw: NonNull<P>) -> Self {
        Self {
            firmware,
            raw,
            _marker: PhantomData,
        }
    }

    /// The protocol table.
    pub fn table(&self) -> &P {
        // SAFETY: The firmware keeps protocol tables alive while boot services run.
        unsafe { self.raw.as_ref() }
    }
}
