//! In-memory firmware tables for host tests.
//!
//! [FakeFirmware] builds a system table and boot services table whose slots point at the
//! `extern "efiapi"` functions below. Their state is thread-local, so every test gets
//! a fresh firmware on its own test thread.

use crate::firmware::{
    BootServices, Firmware, InputKey, MemoryType, OpenProtocolAttributes, SearchType,
    SimpleTextInput, SystemTable,
};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ffi::c_void;
use std::ops::Deref;
use uefi_raw::{Char16, Event, Guid, Handle, Status};

/// Bytes reserved in front of every fake pool allocation to remember its size.
const POOL_HEADER: usize = 16;

/// Image handle of the fake firmware.
const IMAGE_HANDLE: usize = 0x1000;

/// Event signalled by the fake console input.
const KEY_EVENT: usize = 0x2000;

thread_local! {
    static LIVE_POOLS: Cell<usize> = const { Cell::new(0) };
    static POOL_EXHAUSTED: Cell<bool> = const { Cell::new(false) };
    static REGISTRY: RefCell<Vec<(Guid, Handle, *mut c_void)>> = const { RefCell::new(Vec::new()) };
    static OPENED: RefCell<Vec<(Handle, Guid)>> = const { RefCell::new(Vec::new()) };
    /// Keys already waiting in the console input buffer.
    static BUFFERED_KEYS: RefCell<VecDeque<InputKey>> = const { RefCell::new(VecDeque::new()) };
    /// Keys that arrive one per wait.
    static TYPED_KEYS: RefCell<VecDeque<InputKey>> = const { RefCell::new(VecDeque::new()) };
    static WAITS: Cell<usize> = const { Cell::new(0) };
}

fn reset_state() {
    LIVE_POOLS.set(0);
    POOL_EXHAUSTED.set(false);
    REGISTRY.with_borrow_mut(Vec::clear);
    OPENED.with_borrow_mut(Vec::clear);
    BUFFERED_KEYS.with_borrow_mut(VecDeque::clear);
    TYPED_KEYS.with_borrow_mut(VecDeque::clear);
    WAITS.set(0);
}

/// Number of fake pool allocations not yet freed.
pub fn live_pools() -> usize {
    LIVE_POOLS.get()
}

/// Make every following pool allocation fail.
pub fn exhaust_pool(exhausted: bool) {
    POOL_EXHAUSTED.set(exhausted);
}

/// Install `interface` for `protocol` on `handle`.
pub fn register(protocol: Guid, handle: Handle, interface: *mut c_void) {
    REGISTRY.with_borrow_mut(|registry| registry.push((protocol, handle, interface)));
}

/// Number of protocols currently opened and not yet closed.
pub fn open_count() -> usize {
    OPENED.with_borrow(Vec::len)
}

/// Queue keys that are already pending before anyone waits.
pub fn buffer_keys(keys: &[InputKey]) {
    BUFFERED_KEYS.with_borrow_mut(|buffered| buffered.extend(keys));
}

/// Queue keys that arrive one at a time, each after a wait for the key event.
pub fn type_keys(keys: &[InputKey]) {
    TYPED_KEYS.with_borrow_mut(|typed| typed.extend(keys));
}

/// Number of times WaitForEvent was called.
pub fn wait_count() -> usize {
    WAITS.get()
}

/// Allocate from the fake pool, the way firmware allocates records it hands out.
pub fn pool_allocate(size: usize) -> *mut c_void {
    let mut buffer = std::ptr::null_mut();
    let status = unsafe { fake_allocate_pool(MemoryType::LOADER_DATA, size, &mut buffer) };
    assert_eq!(status, Status::SUCCESS);
    buffer
}

/// A printable key.
pub fn key(character: char) -> InputKey {
    InputKey {
        scan_code: 0,
        unicode_char: character as Char16,
    }
}

unsafe extern "efiapi" fn fake_allocate_pool(
    pool_type: MemoryType,
    size: usize,
    buffer: *mut *mut c_void,
) -> Status {
    if buffer.is_null() || pool_type != MemoryType::LOADER_DATA {
        return Status::INVALID_PARAMETER;
    }
    if POOL_EXHAUSTED.get() {
        return Status::OUT_OF_RESOURCES;
    }

    let Ok(layout) = Layout::from_size_align(size + POOL_HEADER, POOL_HEADER) else {
        return Status::OUT_OF_RESOURCES;
    };
    unsafe {
        let base = alloc_zeroed(layout);
        if base.is_null() {
            return Status::OUT_OF_RESOURCES;
        }
        // Fill with garbage so that callers must zero the buffer themselves.
        base.add(POOL_HEADER).write_bytes(0xa5, size);
        base.cast::<usize>().write(size);
        *buffer = base.add(POOL_HEADER).cast();
    }
    LIVE_POOLS.set(LIVE_POOLS.get() + 1);
    Status::SUCCESS
}

unsafe extern "efiapi" fn fake_free_pool(buffer: *mut c_void) -> Status {
    if buffer.is_null() {
        return Status::INVALID_PARAMETER;
    }
    unsafe {
        let base = buffer.cast::<u8>().sub(POOL_HEADER);
        let size = base.cast::<usize>().read();
        dealloc(base, Layout::from_size_align_unchecked(size + POOL_HEADER, POOL_HEADER));
    }
    LIVE_POOLS.set(LIVE_POOLS.get() - 1);
    Status::SUCCESS
}

unsafe extern "efiapi" fn fake_wait_for_event(
    number_of_events: usize,
    events: *mut Event,
    index: *mut usize,
) -> Status {
    if number_of_events != 1 || unsafe { *events } != KEY_EVENT as Event {
        return Status::INVALID_PARAMETER;
    }
    WAITS.set(WAITS.get() + 1);

    // Nothing will ever be typed, so a real wait would never return.
    let Some(key) = TYPED_KEYS.with_borrow_mut(VecDeque::pop_front) else {
        return Status::DEVICE_ERROR;
    };
    BUFFERED_KEYS.with_borrow_mut(|buffered| buffered.push_back(key));
    unsafe { *index = 0 };
    Status::SUCCESS
}

unsafe extern "efiapi" fn fake_locate_handle(
    search_type: SearchType,
    protocol: *const Guid,
    _search_key: *mut c_void,
    buffer_size: *mut usize,
    buffer: *mut Handle,
) -> Status {
    if search_type != SearchType::BY_PROTOCOL || protocol.is_null() || buffer_size.is_null() {
        return Status::INVALID_PARAMETER;
    }

    let protocol = unsafe { *protocol };
    let mut handles = REGISTRY.with_borrow(|registry| {
        registry
            .iter()
            .filter(|(guid, _, _)| *guid == protocol)
            .map(|(_, handle, _)| *handle)
            .collect::<Vec<_>>()
    });
    handles.dedup();
    if handles.is_empty() {
        return Status::NOT_FOUND;
    }

    let needed = handles.len() * size_of::<Handle>();
    unsafe {
        if *buffer_size < needed {
            *buffer_size = needed;
            return Status::BUFFER_TOO_SMALL;
        }
        buffer.copy_from(handles.as_ptr(), handles.len());
        *buffer_size = needed;
    }
    Status::SUCCESS
}

unsafe extern "efiapi" fn fake_open_protocol(
    handle: Handle,
    protocol: *const Guid,
    interface: *mut *mut c_void,
    agent_handle: Handle,
    _controller_handle: Handle,
    attributes: OpenProtocolAttributes,
) -> Status {
    if agent_handle.is_null() || attributes != OpenProtocolAttributes::BY_HANDLE_PROTOCOL {
        return Status::INVALID_PARAMETER;
    }

    let protocol = unsafe { *protocol };
    let found = REGISTRY.with_borrow(|registry| {
        registry
            .iter()
            .find(|(guid, owner, _)| *guid == protocol && *owner == handle)
            .map(|(_, _, interface)| *interface)
    });
    let Some(found) = found else {
        return Status::UNSUPPORTED;
    };

    unsafe { *interface = found };
    OPENED.with_borrow_mut(|opened| opened.push((handle, protocol)));
    Status::SUCCESS
}

unsafe extern "efiapi" fn fake_close_protocol(
    handle: Handle,
    protocol: *const Guid,
    _agent_handle: Handle,
    _controller_handle: Handle,
) -> Status {
    let protocol = unsafe { *protocol };
    OPENED.with_borrow_mut(|opened| {
        match opened
            .iter()
            .position(|(owner, guid)| *owner == handle && *guid == protocol)
        {
            Some(index) => {
                opened.remove(index);
                Status::SUCCESS
            }
            None => Status::NOT_FOUND,
        }
    })
}

unsafe extern "efiapi" fn fake_locate_protocol(
    protocol: *const Guid,
    _registration: *mut c_void,
    interface: *mut *mut c_void,
) -> Status {
    let protocol = unsafe { *protocol };
    let found = REGISTRY.with_borrow(|registry| {
        registry
            .iter()
            .find(|(guid, _, _)| *guid == protocol)
            .map(|(_, _, interface)| *interface)
    });
    match found {
        Some(found) => {
            unsafe { *interface = found };
            Status::SUCCESS
        }
        None => Status::NOT_FOUND,
    }
}

unsafe extern "efiapi" fn fake_read_key_stroke(
    _this: *mut SimpleTextInput,
    key: *mut InputKey,
) -> Status {
    match BUFFERED_KEYS.with_borrow_mut(VecDeque::pop_front) {
        Some(next) => {
            unsafe { *key = next };
            Status::SUCCESS
        }
        None => Status::NOT_READY,
    }
}

/// Firmware tables backed by the fakes in this module.
pub struct FakeFirmware {
    firmware: Firmware,
    system: *mut SystemTable,
    _system_box: Box<SystemTable>,
    _boot: Box<BootServices>,
    _input: Box<SimpleTextInput>,
    _vendor: Vec<Char16>,
}

impl FakeFirmware {
    /// Fake firmware with every slot this crate calls populated.
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    /// Fake firmware whose boot services are adjusted by `configure` first.
    pub fn with(configure: impl FnOnce(&mut BootServices)) -> Self {
        reset_state();

        // SAFETY: Every field of the tables is an integer, a raw pointer or an optional
        // function pointer, all of which are valid when zeroed.
        let mut boot: Box<BootServices> = Box::new(unsafe { core::mem::zeroed() });
        boot.allocate_pool = Some(fake_allocate_pool);
        boot.free_pool = Some(fake_free_pool);
        boot.wait_for_event = Some(fake_wait_for_event);
        boot.locate_handle = Some(fake_locate_handle);
        boot.open_protocol = Some(fake_open_protocol);
        boot.close_protocol = Some(fake_close_protocol);
        boot.locate_protocol = Some(fake_locate_protocol);
        configure(&mut boot);

        let mut input = Box::new(SimpleTextInput {
            reset: None,
            read_key_stroke: Some(fake_read_key_stroke),
            wait_for_key: KEY_EVENT as Event,
        });

        let vendor = "efikit test firmware"
            .encode_utf16()
            .chain(core::iter::once(0))
            .collect::<Vec<_>>();

        // SAFETY: See above.
        let mut system: Box<SystemTable> = Box::new(unsafe { core::mem::zeroed() });
        system.firmware_vendor = vendor.as_ptr();
        system.firmware_revision = 0x0001_0000;
        system.con_in = &mut *input;
        system.boot_services = &mut *boot;
        let system_ptr: *mut SystemTable = &mut *system;

        // SAFETY: The tables are owned by the returned value and outlive the accessor.
        let firmware = unsafe { Firmware::new(IMAGE_HANDLE as Handle, system_ptr) }
            .expect("fake firmware tables are valid");

        Self {
            firmware,
            system: system_ptr,
            _system_box: system,
            _boot: boot,
            _input: input,
            _vendor: vendor,
        }
    }

    /// The fake system table, as passed to an image entry point.
    pub fn system_table_ptr(&self) -> *mut SystemTable {
        self.system
    }
}

impl Deref for FakeFirmware {
    type Target = Firmware;

    fn deref(&self) -> &Firmware {
        &self.firmware
    }
}
