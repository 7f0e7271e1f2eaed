use crate::discovery::{Interface, Protocol};
use crate::firmware::Firmware;
use crate::pool::{Fetched, PoolBuffer, fetch_with_retry};
use crate::status::{StatusError, check, require};
use crate::strings::{decode_utf16_bytes, encode_utf16};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use anyhow::{Context, Result};
use bitflags::bitflags;
use core::ffi::c_void;
use core::marker::PhantomData;
use core::mem::{ManuallyDrop, MaybeUninit, size_of};
use core::ptr::{self, NonNull};
use log::{debug, error};
use uefi_raw::{Char16, Guid, Status, guid};

/// Initial buffer offered to firmware when reading a directory entry.
const DIRECTORY_ENTRY_BUFFER: usize = 256;

/// Chunk size used by [File::read_to_end].
const READ_CHUNK: usize = 4096;

bitflags! {
    /// Mode bits for opening a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct FileMode: u64 {
        /// Open for reading.
        const READ = 0x0000_0000_0000_0001;
        /// Open for writing.
        const WRITE = 0x0000_0000_0000_0002;
        /// Create the file if it does not exist.
        const CREATE = 0x8000_0000_0000_0000;
    }
}

bitflags! {
    /// Attribute bits of a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct FileAttributes: u64 {
        const READ_ONLY = 0x0000_0000_0000_0001;
        const HIDDEN = 0x0000_0000_0000_0002;
        const SYSTEM = 0x0000_0000_0000_0004;
        const RESERVED = 0x0000_0000_0000_0008;
        const DIRECTORY = 0x0000_0000_0000_0010;
        const ARCHIVE = 0x0000_0000_0000_0020;
    }
}

impl FileAttributes {
    /// Every attribute a caller may set.
    pub const VALID: Self = Self::from_bits_retain(0x0000_0000_0000_0037);
}

/// The simple file system protocol.
#[repr(C)]
pub struct SimpleFileSystemProtocol {
    pub revision: u64,
    pub open_volume: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleFileSystemProtocol,
            root: *mut *mut FileProtocol,
        ) -> Status,
    >,
}

impl Protocol for SimpleFileSystemProtocol {
    const GUID: Guid = guid!("964e5b22-6459-11d2-8e39-00a0c969723b");
}

/// The file protocol, revision 1 layout.
#[repr(C)]
pub struct FileProtocol {
    pub revision: u64,
    pub open: Option<
        unsafe extern "efiapi" fn(
            this: *mut FileProtocol,
            new_handle: *mut *mut FileProtocol,
            file_name: *const Char16,
            open_mode: FileMode,
            attributes: FileAttributes,
        ) -> Status,
    >,
    pub close: Option<unsafe extern "efiapi" fn(this: *mut FileProtocol) -> Status>,
    pub delete: Option<unsafe extern "efiapi" fn(this: *mut FileProtocol) -> Status>,
    pub read: Option<
        unsafe extern "efiapi" fn(
            this: *mut FileProtocol,
            buffer_size: *mut usize,
            buffer: *mut c_void,
        ) -> Status,
    >,
    pub write: Option<
        unsafe extern "efiapi" fn(
            this: *mut FileProtocol,
            buffer_size: *mut usize,
            buffer: *const c_void,
        ) -> Status,
    >,
    pub get_position:
        Option<unsafe extern "efiapi" fn(this: *mut FileProtocol, position: *mut u64) -> Status>,
    pub set_position:
        Option<unsafe extern "efiapi" fn(this: *mut FileProtocol, position: u64) -> Status>,
    pub get_info: Option<
        unsafe extern "efiapi" fn(
            this: *mut FileProtocol,
            information_type: *const Guid,
            buffer_size: *mut usize,
            buffer: *mut c_void,
        ) -> Status,
    >,
    pub set_info: Option<
        unsafe extern "efiapi" fn(
            this: *mut FileProtocol,
            information_type: *const Guid,
            buffer_size: usize,
            buffer: *const c_void,
        ) -> Status,
    >,
    pub flush: Option<unsafe extern "efiapi" fn(this: *mut FileProtocol) -> Status>,
}

/// A timestamp as stored in file information records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Time {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub pad1: u8,
    pub nanosecond: u32,
    pub time_zone: i16,
    pub daylight: u8,
    pub pad2: u8,
}

/// Fixed part of a file information record. The file name follows it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct FileInfo {
    /// Size of the whole record, name included.
    pub size: u64,
    pub file_size: u64,
    pub physical_size: u64,
    pub create_time: Time,
    pub last_access_time: Time,
    pub modification_time: Time,
    pub attribute: FileAttributes,
}

impl FileInfo {
    /// Whether the record describes a directory.
    pub fn is_directory(&self) -> bool {
        self.attribute.contains(FileAttributes::DIRECTORY)
    }
}

/// Fixed part of a file system information record. The volume label follows it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct FileSystemInfo {
    /// Size of the whole record, label included.
    pub size: u64,
    pub read_only: u8,
    pub volume_size: u64,
    pub free_space: u64,
    pub block_size: u32,
}

/// An information record type that can be queried with GetInfo.
pub trait InfoType: Copy {
    /// The information type GUID.
    const ID: Guid;
    /// Byte offset of the trailing UTF-16 name.
    const NAME_OFFSET: usize;
}

impl InfoType for FileInfo {
    const ID: Guid = guid!("09576e92-6d3f-11d2-8e39-00a0c969723b");
    const NAME_OFFSET: usize = size_of::<FileInfo>();
}

impl InfoType for FileSystemInfo {
    const ID: Guid = guid!("09576e93-6d3f-11d2-8e39-00a0c969723b");
    // The label starts right after the block size, before the struct's tail padding.
    const NAME_OFFSET: usize = 36;
}

/// An information record returned by firmware, held in a pool buffer.
pub struct InfoBuffer<'fw, T: InfoType> {
    /// The pool buffer holding the record.
    buffer: PoolBuffer<'fw>,
    /// The number of bytes the firmware filled.
    size: usize,
    _marker: PhantomData<T>,
}

impl<'fw, T: InfoType> InfoBuffer<'fw, T> {
    /// Validate a fetched record: it must at least hold the fixed header.
    fn from_fetched(fetched: Fetched<'fw>) -> Result<Self> {
        match fetched.buffer {
            Some(buffer) if fetched.size >= T::NAME_OFFSET => Ok(Self {
                buffer,
                size: fetched.size,
                _marker: PhantomData,
            }),
            _ => Err(StatusError::new(Status::BAD_BUFFER_SIZE))
                .context("firmware returned an information record shorter than its header"),
        }
    }

    /// The fixed part of the record.
    pub fn header(&self) -> T {
        let bytes = self.as_bytes();
        let length = bytes.len().min(size_of::<T>());
        let mut header = MaybeUninit::<T>::zeroed();
        // SAFETY: Information records are plain integers, so any byte pattern is valid,
        // and we never copy more than either side holds.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), header.as_mut_ptr().cast::<u8>(), length);
            header.assume_init()
        }
    }

    /// The trailing name: the file name or the volume label.
    pub fn name(&self) -> String {
        decode_utf16_bytes(&self.as_bytes()[T::NAME_OFFSET..])
    }

    /// The raw bytes of the record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer.as_bytes()[..self.size]
    }
}

/// An open file or directory. The file is closed when dropped.
pub struct File<'fw> {
    interface: Interface<'fw, FileProtocol>,
}

/// Open the root directory of the first volume that provides the simple file system protocol.
pub fn open_root_volume(firmware: &Firmware) -> Result<File<'_>> {
    let file_system = firmware
        .locate::<SimpleFileSystemProtocol>()
        .context("unable to locate simple file system")?;

    // SAFETY: Located protocol tables stay valid while boot services run.
    let open_volume = require(unsafe { file_system.as_ref() }.open_volume, "OpenVolume")?;

    let mut root = ptr::null_mut();
    // SAFETY: All pointers are valid for the duration of the call.
    let status = unsafe { open_volume(file_system.as_ptr(), &mut root) };
    check(status).context("unable to open root volume")?;

    // SAFETY: The firmware just opened this file for us.
    unsafe { File::from_raw(firmware, root) }
}

impl<'fw> File<'fw> {
    /// Take ownership of an open file protocol.
    ///
    /// # Safety
    /// `raw` must be null or an open file that nothing else will close.
    pub unsafe fn from_raw(firmware: &'fw Firmware, raw: *mut FileProtocol) -> Result<Self> {
        let raw = NonNull::new(raw)
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("firmware returned a null file handle")?;
        Ok(Self {
            interface: Interface::new(firmware, raw),
        })
    }

    /// The raw protocol pointer to pass as `this`.
    fn this(&self) -> *mut FileProtocol {
        self.interface.raw.as_ptr()
    }

    /// The protocol table.
    fn table(&self) -> &FileProtocol {
        self.interface.table()
    }

    /// Open `name` relative to this directory.
    pub fn open(&self, name: &str, mode: FileMode, attributes: FileAttributes) -> Result<File<'fw>> {
        let open = require(self.table().open, "Open")?;
        let encoded = encode_utf16(name)?;

        let mut handle = ptr::null_mut();
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe { open(self.this(), &mut handle, encoded.as_ptr(), mode, attributes) };
        check(status).with_context(|| format!("unable to open file {}", name))?;

        debug!("opened file {} with mode {:?}", name, mode);
        // SAFETY: The firmware just opened this file for us.
        unsafe { File::from_raw(self.interface.firmware, handle) }
    }

    /// Read into `buffer`, returning the number of bytes read. Zero means end of file.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let read = require(self.table().read, "Read")?;

        let mut size = buffer.len();
        // SAFETY: `buffer` is valid for `size` bytes of writes.
        let status = unsafe { read(self.this(), &mut size, buffer.as_mut_ptr().cast()) };
        check(status).context("unable to read file")?;

        // The firmware can only shrink the size on success.
        Ok(size.min(buffer.len()))
    }

    /// Read from the current position to the end of the file.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let read = self.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..read]);
        }
        Ok(content)
    }

    /// Write `data` at the current position, returning the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let write = require(self.table().write, "Write")?;

        let mut size = data.len();
        // SAFETY: `data` is valid for `size` bytes of reads.
        let status = unsafe { write(self.this(), &mut size, data.as_ptr().cast()) };
        check(status).context("unable to write file")?;
        Ok(size)
    }

    /// The current byte position.
    pub fn position(&self) -> Result<u64> {
        let get_position = require(self.table().get_position, "GetPosition")?;
        let mut position = 0;
        // SAFETY: `position` is a valid out pointer.
        let status = unsafe { get_position(self.this(), &mut position) };
        check(status).context("unable to get file position")?;
        Ok(position)
    }

    /// Move to byte `position`. `u64::MAX` moves to the end of the file.
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        let set_position = require(self.table().set_position, "SetPosition")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { set_position(self.this(), position) };
        check(status).context("unable to set file position")?;
        Ok(())
    }

    /// Flush pending writes.
    pub fn flush(&mut self) -> Result<()> {
        let flush = require(self.table().flush, "Flush")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { flush(self.this()) };
        check(status).context("unable to flush file")?;
        Ok(())
    }

    /// Query an information record of type `T`.
    /// The size is probed with a zero-length call before the record is fetched.
    pub fn get_info<T: InfoType>(&self) -> Result<InfoBuffer<'fw, T>> {
        let get_info = require(self.table().get_info, "GetInfo")?;
        let this = self.this();

        let fetched = fetch_with_retry(self.interface.firmware, 0, |size, buffer| {
            // SAFETY: `size` and `buffer` describe memory owned by fetch_with_retry.
            unsafe { get_info(this, &T::ID, size, buffer) }
        })
        .with_context(|| format!("unable to get information {}", T::ID))?;

        InfoBuffer::from_fetched(fetched)
    }

    /// Information about this file.
    pub fn info(&self) -> Result<InfoBuffer<'fw, FileInfo>> {
        self.get_info::<FileInfo>()
    }

    /// Information about the volume this file lives on.
    pub fn volume_info(&self) -> Result<InfoBuffer<'fw, FileSystemInfo>> {
        self.get_info::<FileSystemInfo>()
    }

    /// Read the next entry of this directory. [None] marks the end of the directory.
    pub fn read_entry(&mut self) -> Result<Option<InfoBuffer<'fw, FileInfo>>> {
        let read = require(self.table().read, "Read")?;
        let this = self.this();

        let fetched = fetch_with_retry(
            self.interface.firmware,
            DIRECTORY_ENTRY_BUFFER,
            |size, buffer| {
                // SAFETY: `size` and `buffer` describe memory owned by fetch_with_retry.
                unsafe { read(this, size, buffer) }
            },
        )
        .context("unable to read directory entry")?;

        // A zero-length read is the end of the directory.
        if fetched.size == 0 {
            return Ok(None);
        }
        InfoBuffer::from_fetched(fetched).map(Some)
    }

    /// Iterate over the remaining entries of this directory.
    pub fn entries(&mut self) -> DirectoryEntries<'_, 'fw> {
        DirectoryEntries {
            directory: self,
            done: false,
        }
    }

    /// Delete this file. The handle is closed whether or not the delete succeeds.
    pub fn delete(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        let delete = match require(this.table().delete, "Delete") {
            Ok(delete) => delete,
            Err(error) => {
                // Without a delete slot we still owe the firmware a close.
                ManuallyDrop::into_inner(this).close()?;
                return Err(error);
            }
        };
        // SAFETY: Delete consumes the handle, so it is never used again.
        let status = unsafe { delete(this.this()) };
        check(status).context("unable to delete file")?;
        Ok(())
    }

    /// Close this file, reporting any failure.
    pub fn close(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        this.close_handle()
    }

    /// Call Close on the handle.
    fn close_handle(&self) -> Result<()> {
        let close = require(self.table().close, "Close")?;
        // SAFETY: The handle is open and is not used after this call.
        let status = unsafe { close(self.this()) };
        check(status).context("unable to close file")?;
        Ok(())
    }
}

impl Drop for File<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.close_handle() {
            error!("unable to close file: {:#}", error);
        }
    }
}

/// Iterator over directory entries, see [File::entries].
/// Iteration stops after the first error.
pub struct DirectoryEntries<'dir, 'fw> {
    directory: &'dir mut File<'fw>,
    done: bool,
}

impl<'fw> Iterator for DirectoryEntries<'_, 'fw> {
    type Item = Result<InfoBuffer<'fw, FileInfo>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.directory.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
