use crate::status::{StatusError, fail};
use crate::strings::decode_utf16_ptr;
use alloc::string::String;
use anyhow::{Context, Result};
use bitflags::bitflags;
use core::ffi::c_void;
use core::ptr::NonNull;
use spin::Once;
use uefi_raw::{Char16, Event, Guid, Handle, Status};

/// Longest firmware vendor string we are willing to decode, in UTF-16 units.
const FIRMWARE_VENDOR_LIMIT: usize = 256;

/// Header shared by every EFI table.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TableHeader {
    /// Table signature.
    pub signature: u64,
    /// UEFI revision the table conforms to.
    pub revision: u32,
    /// Size of the entire table, including this header.
    pub header_size: u32,
    /// CRC32 of the table.
    pub crc32: u32,
    /// Must be zero.
    pub reserved: u32,
}

/// The EFI system table handed to the image entry point.
#[repr(C)]
pub struct SystemTable {
    pub header: TableHeader,
    pub firmware_vendor: *const Char16,
    pub firmware_revision: u32,
    pub console_in_handle: Handle,
    pub con_in: *mut SimpleTextInput,
    pub console_out_handle: Handle,
    /// Text output is driven by the application, so the table stays opaque here.
    pub con_out: *mut c_void,
    pub standard_error_handle: Handle,
    pub std_err: *mut c_void,
    pub runtime_services: *mut c_void,
    pub boot_services: *mut BootServices,
    pub number_of_table_entries: usize,
    pub configuration_table: *mut c_void,
}

/// Memory type requested from the pool allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct MemoryType(pub u32);

impl MemoryType {
    pub const RESERVED: Self = Self(0);
    pub const LOADER_CODE: Self = Self(1);
    pub const LOADER_DATA: Self = Self(2);
    pub const BOOT_SERVICES_CODE: Self = Self(3);
    pub const BOOT_SERVICES_DATA: Self = Self(4);
}

/// Search mode for LocateHandle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SearchType(pub u32);

impl SearchType {
    pub const ALL_HANDLES: Self = Self(0);
    pub const BY_REGISTER_NOTIFY: Self = Self(1);
    pub const BY_PROTOCOL: Self = Self(2);
}

bitflags! {
    /// Attributes for OpenProtocol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct OpenProtocolAttributes: u32 {
        /// Used by HandleProtocol-style consumers.
        const BY_HANDLE_PROTOCOL = 0x01;
        /// Retrieve the interface without tracking an open.
        const GET_PROTOCOL = 0x02;
        /// Only test whether the protocol is present.
        const TEST_PROTOCOL = 0x04;
        /// Opened by a child controller.
        const BY_CHILD_CONTROLLER = 0x08;
        /// Opened by a driver.
        const BY_DRIVER = 0x10;
        /// Opened exclusively.
        const EXCLUSIVE = 0x20;
    }
}

/// The EFI boot services table.
///
/// Only the slots this crate calls are typed. Everything else is kept as an opaque
/// pointer-sized placeholder so that the typed slots land at their published offsets.
#[repr(C)]
pub struct BootServices {
    pub header: TableHeader,

    pub raise_tpl: usize,
    pub restore_tpl: usize,

    pub allocate_pages: usize,
    pub free_pages: usize,
    pub get_memory_map: usize,
    pub allocate_pool: Option<
        unsafe extern "efiapi" fn(
            pool_type: MemoryType,
            size: usize,
            buffer: *mut *mut c_void,
        ) -> Status,
    >,
    pub free_pool: Option<unsafe extern "efiapi" fn(buffer: *mut c_void) -> Status>,

    pub create_event: usize,
    pub set_timer: usize,
    pub wait_for_event: Option<
        unsafe extern "efiapi" fn(
            number_of_events: usize,
            events: *mut Event,
            index: *mut usize,
        ) -> Status,
    >,
    pub signal_event: usize,
    pub close_event: usize,
    pub check_event: usize,

    pub install_protocol_interface: usize,
    pub reinstall_protocol_interface: usize,
    pub uninstall_protocol_interface: usize,
    pub handle_protocol: usize,
    pub reserved: usize,
    pub register_protocol_notify: usize,
    pub locate_handle: Option<
        unsafe extern "efiapi" fn(
            search_type: SearchType,
            protocol: *const Guid,
            search_key: *mut c_void,
            buffer_size: *mut usize,
            buffer: *mut Handle,
        ) -> Status,
    >,
    pub locate_device_path: usize,
    pub install_configuration_table: usize,

    pub load_image: usize,
    pub start_image: usize,
    pub exit: usize,
    pub unload_image: usize,
    pub exit_boot_services: usize,

    pub get_next_monotonic_count: usize,
    pub stall: usize,
    pub set_watchdog_timer: usize,

    pub connect_controller: usize,
    pub disconnect_controller: usize,

    pub open_protocol: Option<
        unsafe extern "efiapi" fn(
            handle: Handle,
            protocol: *const Guid,
            interface: *mut *mut c_void,
            agent_handle: Handle,
            controller_handle: Handle,
            attributes: OpenProtocolAttributes,
        ) -> Status,
    >,
    pub close_protocol: Option<
        unsafe extern "efiapi" fn(
            handle: Handle,
            protocol: *const Guid,
            agent_handle: Handle,
            controller_handle: Handle,
        ) -> Status,
    >,
    pub open_protocol_information: usize,

    pub protocols_per_handle: usize,
    pub locate_handle_buffer: usize,
    pub locate_protocol: Option<
        unsafe extern "efiapi" fn(
            protocol: *const Guid,
            registration: *mut c_void,
            interface: *mut *mut c_void,
        ) -> Status,
    >,
    pub install_multiple_protocol_interfaces: usize,
    pub uninstall_multiple_protocol_interfaces: usize,

    pub calculate_crc32: usize,

    pub copy_mem: usize,
    pub set_mem: usize,
    pub create_event_ex: usize,
}

/// A keystroke as reported by the simple text input protocol.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InputKey {
    /// Scan code for special keys, zero for printable keys.
    pub scan_code: u16,
    /// UTF-16 code unit for printable keys, zero for special keys.
    pub unicode_char: Char16,
}

/// The simple text input protocol behind the system table's console-in.
#[repr(C)]
pub struct SimpleTextInput {
    pub reset: Option<
        unsafe extern "efiapi" fn(this: *mut SimpleTextInput, extended_verification: bool) -> Status,
    >,
    pub read_key_stroke:
        Option<unsafe extern "efiapi" fn(this: *mut SimpleTextInput, key: *mut InputKey) -> Status>,
    /// Signalled when a keystroke is available.
    pub wait_for_key: Event,
}

/// The dispatch-table accessor.
/// Every wrapper in this crate reaches firmware through a [Firmware] value.
#[derive(Debug)]
pub struct Firmware {
    /// Handle of the running image, used as the agent when opening protocols.
    image: Handle,
    /// The system table passed to the entry point.
    system: NonNull<SystemTable>,
    /// The boot services table referenced by the system table.
    boot: NonNull<BootServices>,
}

// SAFETY: Boot services run on a single processor without preemption of our image,
// so the tables are never accessed concurrently.
unsafe impl Send for Firmware {}
// SAFETY: See above.
unsafe impl Sync for Firmware {}

impl Firmware {
    /// Create a dispatch-table accessor from the `image` handle and `system_table`
    /// passed to the image entry point.
    ///
    /// # Safety
    /// `system_table` must point to a valid system table whose boot services stay
    /// valid for as long as the returned value is used.
    pub unsafe fn new(image: Handle, system_table: *mut SystemTable) -> Result<Self> {
        if image.is_null() {
            return Err(fail(Status::INVALID_PARAMETER, "image handle is null"));
        }

        let system = NonNull::new(system_table)
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("system table pointer is null")?;

        // SAFETY: The caller guarantees the system table is valid.
        let boot = NonNull::new(unsafe { system.as_ref() }.boot_services)
            .ok_or(StatusError::new(Status::INVALID_PARAMETER))
            .context("boot services pointer is null")?;

        Ok(Self {
            image,
            system,
            boot,
        })
    }

    /// The handle of the running image.
    pub fn image_handle(&self) -> Handle {
        self.image
    }

    /// The system table.
    pub fn system_table(&self) -> &SystemTable {
        // SAFETY: Validated non-null on construction, kept valid by the constructor's contract.
        unsafe { self.system.as_ref() }
    }

    /// The boot services table.
    pub fn boot_services(&self) -> &BootServices {
        // SAFETY: Validated non-null on construction, kept valid by the constructor's contract.
        unsafe { self.boot.as_ref() }
    }

    /// The firmware revision reported in the system table.
    pub fn firmware_revision(&self) -> u32 {
        self.system_table().firmware_revision
    }

    /// The firmware vendor string, if the firmware provides one.
    pub fn firmware_vendor(&self) -> Option<String> {
        // SAFETY: The vendor string is NUL-terminated per the system table contract,
        // and we cap the length regardless.
        unsafe { decode_utf16_ptr(self.system_table().firmware_vendor, FIRMWARE_VENDOR_LIMIT) }
    }

    /// The console input protocol from the system table.
    pub fn console_input(&self) -> Result<NonNull<SimpleTextInput>> {
        NonNull::new(self.system_table().con_in)
            .ok_or(StatusError::new(Status::UNSUPPORTED))
            .context("system table has no console input")
    }
}

/// The process-wide dispatch tables, installed once by the application entry point.
static FIRMWARE: Once<Firmware> = Once::new();

/// Install the dispatch tables for the running image. This may only happen once.
///
/// # Safety
/// See [Firmware::new]. Additionally the tables must stay valid for the rest of the
/// program, which holds until boot services are exited.
pub unsafe fn install(image: Handle, system_table: *mut SystemTable) -> Result<&'static Firmware> {
    // Track whether this call performed the installation.
    let mut installed_now = false;

    let firmware = FIRMWARE.try_call_once(|| {
        installed_now = true;
        // SAFETY: Forwarded from the caller.
        unsafe { Firmware::new(image, system_table) }
    })?;

    if !installed_now {
        return Err(fail(
            Status::ALREADY_STARTED,
            "firmware tables have already been installed",
        ));
    }
    Ok(firmware)
}

/// Retrieve the installed dispatch tables.
pub fn firmware() -> Result<&'static Firmware> {
    FIRMWARE
        .get()
        .ok_or(StatusError::new(Status::NOT_READY))
        .context("firmware tables have not been installed")
}
