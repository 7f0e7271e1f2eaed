use crate::firmware::{Firmware, MemoryType};
use crate::status::{StatusError, check, require};
use anyhow::{Context, Result};
use core::ffi::c_void;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use log::{debug, error};
use uefi_raw::Status;

/// A byte buffer allocated from the firmware pool.
/// The buffer is zeroed on allocation and returned to the pool when dropped.
pub struct PoolBuffer<'fw> {
    /// The firmware that owns the pool.
    firmware: &'fw Firmware,
    /// Start of the allocation.
    pointer: NonNull<u8>,
    /// Length of the allocation in bytes.
    len: usize,
}

impl<'fw> PoolBuffer<'fw> {
    /// Length of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is zero bytes long.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer to the start of the buffer.
    pub fn as_ptr(&self) -> *const u8 {
        self.pointer.as_ptr()
    }

    /// Mutable raw pointer to the start of the buffer, for handing to firmware.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.pointer.as_ptr()
    }

    /// The contents of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: The allocation is `len` bytes long and was zeroed when allocated.
        unsafe { core::slice::from_raw_parts(self.pointer.as_ptr(), self.len) }
    }
}

impl Drop for PoolBuffer<'_> {
    fn drop(&mut self) {
        // There is nothing better to do than log if the firmware refuses the free.
        if let Err(error) = self.firmware.free_pool(self.pointer.as_ptr().cast()) {
            error!("unable to free pool buffer: {:#}", error);
        }
    }
}

/// A record of type `T` that firmware allocated from the pool on our behalf.
/// The record is returned to the pool when dropped.
pub struct PoolBox<'fw, T> {
    /// The firmware that owns the pool.
    firmware: &'fw Firmware,
    /// The adopted record.
    pointer: NonNull<T>,
}

impl<'fw, T> PoolBox<'fw, T> {
    /// Take ownership of the pool allocation at `pointer`. Returns [None] for null.
    ///
    /// # Safety
    /// `pointer` must be null or a pool allocation holding a valid `T` that nothing else frees.
    pub unsafe fn adopt(firmware: &'fw Firmware, pointer: *mut T) -> Option<Self> {
        NonNull::new(pointer).map(|pointer| Self { firmware, pointer })
    }
}

impl<T> Deref for PoolBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Guaranteed valid by the contract of [PoolBox::adopt].
        unsafe { self.pointer.as_ref() }
    }
}

impl<T> Drop for PoolBox<'_, T> {
    fn drop(&mut self) {
        if let Err(error) = self.firmware.free_pool(self.pointer.as_ptr().cast()) {
            error!("unable to free pool record: {:#}", error);
        }
    }
}

impl Firmware {
    /// Allocate `size` bytes of loader data from the firmware pool.
    pub fn allocate_pool(&self, size: usize) -> Result<PoolBuffer<'_>> {
        let allocate = require(self.boot_services().allocate_pool, "AllocatePool")?;

        let mut buffer = ptr::null_mut();
        // SAFETY: The slot comes from the boot services table and `buffer` is a valid out pointer.
        let status = unsafe { allocate(MemoryType::LOADER_DATA, size, &mut buffer) };
        check(status).context("unable to allocate from the firmware pool")?;

        // A successful call must still produce a buffer.
        let pointer = NonNull::new(buffer.cast::<u8>())
            .ok_or(StatusError::new(Status::OUT_OF_RESOURCES))
            .context("firmware pool returned a null buffer")?;

        // SAFETY: The firmware handed us `size` writable bytes.
        unsafe { pointer.as_ptr().write_bytes(0, size) };

        Ok(PoolBuffer {
            firmware: self,
            pointer,
            len: size,
        })
    }

    /// Return `buffer` to the firmware pool.
    pub(crate) fn free_pool(&self, buffer: *mut c_void) -> Result<()> {
        let free = require(self.boot_services().free_pool, "FreePool")?;
        // SAFETY: Callers only pass buffers that came from AllocatePool.
        let status = unsafe { free(buffer) };
        check(status).context("unable to free pool buffer")?;
        Ok(())
    }
}

/// The result of [fetch_with_retry].
pub struct Fetched<'fw> {
    /// The buffer the firmware filled, or [None] if no buffer was ever needed.
    pub buffer: Option<PoolBuffer<'fw>>,
    /// The number of bytes the firmware reported.
    pub size: usize,
}

/// Run the grow-buffer-and-retry idiom against a firmware `call`.
///
/// The call receives the in/out buffer size and the buffer pointer. When `initial` is
/// zero the first call probes with a null buffer, otherwise a buffer of `initial` bytes
/// is offered. If the firmware answers [Status::BUFFER_TOO_SMALL], the buffer is
/// reallocated to the size it asked for and the call is made once more. A second
/// [Status::BUFFER_TOO_SMALL] is returned to the caller like any other error.
pub fn fetch_with_retry<'fw>(
    firmware: &'fw Firmware,
    initial: usize,
    mut call: impl FnMut(&mut usize, *mut c_void) -> Status,
) -> Result<Fetched<'fw>> {
    let mut size = initial;
    let mut buffer = if initial == 0 {
        None
    } else {
        Some(firmware.allocate_pool(initial)?)
    };

    let mut status = call(&mut size, buffer_pointer(&mut buffer));

    if status == Status::BUFFER_TOO_SMALL {
        debug!("firmware asked for a {} byte buffer, retrying once", size);
        // Release the undersized buffer before asking for the bigger one.
        drop(buffer.take());
        buffer = Some(firmware.allocate_pool(size)?);
        status = call(&mut size, buffer_pointer(&mut buffer));
    }

    check(status)?;

    // Firmware must never report more bytes than it was given room for.
    let capacity = buffer.as_ref().map_or(0, PoolBuffer::len);
    if size > capacity {
        return Err(StatusError::new(Status::BAD_BUFFER_SIZE))
            .context("firmware reported more data than the buffer holds");
    }

    Ok(Fetched { buffer, size })
}

/// The pointer to hand to firmware for an optional buffer.
fn buffer_pointer(buffer: &mut Option<PoolBuffer<'_>>) -> *mut c_void {
    buffer
        .as_mut()
        .map_or(ptr::null_mut(), |buffer| buffer.as_mut_ptr().cast())
}
