use crate::discovery::{Interface, Protocol};
use crate::firmware::Firmware;
use crate::status::{check, fail, require};
use alloc::format;
use anyhow::{Context, Result};
use bitflags::bitflags;
use core::ffi::c_void;
use core::fmt::{self, Display, Formatter};
use core::mem::size_of;
use core::ptr;
use log::{debug, info, warn};
use uefi_raw::{Event, Guid, Status, guid};

/// EtherType stamped on transmitted frames: IPv4.
pub const ETHER_TYPE_IPV4: u16 = 0x0800;

/// A hardware address, padded to 32 bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct MacAddress(pub [u8; 32]);

impl MacAddress {
    /// Build an address from its leading `bytes`, typically the six of an Ethernet MAC.
    pub fn new(bytes: &[u8]) -> Self {
        let mut address = [0u8; 32];
        let length = bytes.len().min(address.len());
        address[..length].copy_from_slice(&bytes[..length]);
        Self(address)
    }

    /// Format the first `length` bytes as colon-separated hex.
    pub fn display(&self, length: usize) -> MacAddressDisplay<'_> {
        MacAddressDisplay {
            address: self,
            length: length.min(self.0.len()),
        }
    }
}

/// See [MacAddress::display].
pub struct MacAddressDisplay<'a> {
    address: &'a MacAddress,
    length: usize,
}

impl Display for MacAddressDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.address.0[..self.length].iter().enumerate() {
            if index > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// State of a network interface.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct NetworkState(pub u32);

impl NetworkState {
    pub const STOPPED: Self = Self(0);
    pub const STARTED: Self = Self(1);
    pub const INITIALIZED: Self = Self(2);
}

impl Display for NetworkState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Self::STOPPED => write!(f, "stopped"),
            Self::STARTED => write!(f, "started"),
            Self::INITIALIZED => write!(f, "initialized"),
            Self(other) => write!(f, "unknown({})", other),
        }
    }
}

bitflags! {
    /// Receive filter bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct ReceiveFilters: u32 {
        const UNICAST = 0x01;
        const MULTICAST = 0x02;
        const BROADCAST = 0x04;
        const PROMISCUOUS = 0x08;
        const PROMISCUOUS_MULTICAST = 0x10;
    }
}

/// Interface counters. Counters the device does not track read as all ones.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct NetworkStatistics {
    pub rx_total_frames: u64,
    pub rx_good_frames: u64,
    pub rx_undersize_frames: u64,
    pub rx_oversize_frames: u64,
    pub rx_dropped_frames: u64,
    pub rx_unicast_frames: u64,
    pub rx_broadcast_frames: u64,
    pub rx_multicast_frames: u64,
    pub rx_crc_error_frames: u64,
    pub rx_total_bytes: u64,
    pub tx_total_frames: u64,
    pub tx_good_frames: u64,
    pub tx_undersize_frames: u64,
    pub tx_oversize_frames: u64,
    pub tx_dropped_frames: u64,
    pub tx_unicast_frames: u64,
    pub tx_broadcast_frames: u64,
    pub tx_multicast_frames: u64,
    pub tx_crc_error_frames: u64,
    pub tx_total_bytes: u64,
    pub collisions: u64,
    pub unsupported_protocol: u64,
    pub rx_duplicated_frames: u64,
    pub rx_decrypt_error_frames: u64,
    pub tx_error_frames: u64,
    pub tx_retry_frames: u64,
}

/// Mode record of a simple network interface.
/// Booleans are kept as bytes since firmware may store any non-zero value.
#[repr(C)]
pub struct SimpleNetworkMode {
    pub state: NetworkState,
    pub hw_address_size: u32,
    pub media_header_size: u32,
    pub max_packet_size: u32,
    pub nv_ram_size: u32,
    pub nv_ram_access_size: u32,
    pub receive_filter_mask: ReceiveFilters,
    pub receive_filter_setting: ReceiveFilters,
    pub max_mcast_filter_count: u32,
    pub mcast_filter_count: u32,
    pub mcast_filter: [MacAddress; 16],
    pub current_address: MacAddress,
    pub broadcast_address: MacAddress,
    pub permanent_address: MacAddress,
    pub if_type: u8,
    pub mac_address_changeable: u8,
    pub multiple_tx_supported: u8,
    pub media_present_supported: u8,
    pub media_present: u8,
}

/// The simple network protocol.
#[repr(C)]
pub struct SimpleNetworkProtocol {
    pub revision: u64,
    pub start: Option<unsafe extern "efiapi" fn(this: *mut SimpleNetworkProtocol) -> Status>,
    pub stop: Option<unsafe extern "efiapi" fn(this: *mut SimpleNetworkProtocol) -> Status>,
    pub initialize: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleNetworkProtocol,
            extra_rx_buffer_size: usize,
            extra_tx_buffer_size: usize,
        ) -> Status,
    >,
    pub reset: usize,
    pub shutdown: Option<unsafe extern "efiapi" fn(this: *mut SimpleNetworkProtocol) -> Status>,
    pub receive_filters: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleNetworkProtocol,
            enable: ReceiveFilters,
            disable: ReceiveFilters,
            reset_mcast_filter: bool,
            mcast_filter_count: usize,
            mcast_filter: *const MacAddress,
        ) -> Status,
    >,
    pub station_address: usize,
    pub statistics: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleNetworkProtocol,
            reset: bool,
            statistics_size: *mut usize,
            statistics_table: *mut NetworkStatistics,
        ) -> Status,
    >,
    pub mcast_ip_to_mac: usize,
    pub nv_data: usize,
    pub get_status: usize,
    pub transmit: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleNetworkProtocol,
            header_size: usize,
            buffer_size: usize,
            buffer: *const c_void,
            source_address: *const MacAddress,
            destination_address: *const MacAddress,
            protocol: *const u16,
        ) -> Status,
    >,
    pub receive: Option<
        unsafe extern "efiapi" fn(
            this: *mut SimpleNetworkProtocol,
            header_size: *mut usize,
            buffer_size: *mut usize,
            buffer: *mut c_void,
            source_address: *mut MacAddress,
            destination_address: *mut MacAddress,
            protocol: *mut u16,
        ) -> Status,
    >,
    pub wait_for_packet: Event,
    pub mode: *mut SimpleNetworkMode,
}

impl Protocol for SimpleNetworkProtocol {
    const GUID: Guid = guid!("a19832b9-ac25-11d3-9a2d-0090273fc14d");
}

/// A packet taken off the wire by [SimpleNetwork::receive].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedPacket {
    /// Bytes written into the caller's buffer, media header included.
    pub length: usize,
    /// Size of the media header at the start of the buffer.
    pub header_size: usize,
    pub source: MacAddress,
    pub destination: MacAddress,
    /// EtherType of the packet.
    pub protocol: u16,
}

/// A located simple network interface.
pub struct SimpleNetwork<'fw> {
    interface: Interface<'fw, SimpleNetworkProtocol>,
}

impl<'fw> SimpleNetwork<'fw> {
    /// Locate the first simple network interface.
    pub fn locate(firmware: &'fw Firmware) -> Result<Self> {
        let raw = firmware
            .locate::<SimpleNetworkProtocol>()
            .context("unable to locate simple network")?;
        Ok(Self {
            interface: Interface::new(firmware, raw),
        })
    }

    fn this(&self) -> *mut SimpleNetworkProtocol {
        self.interface.raw.as_ptr()
    }

    fn table(&self) -> &SimpleNetworkProtocol {
        self.interface.table()
    }

    /// The interface's mode record.
    pub fn mode(&self) -> Result<&SimpleNetworkMode> {
        let mode = self.table().mode;
        if mode.is_null() {
            return Err(fail(Status::NOT_READY, "simple network has no mode"));
        }
        // SAFETY: Non-null mode records are owned by the protocol and outlive it.
        Ok(unsafe { &*mode })
    }

    /// The current interface state.
    pub fn state(&self) -> Result<NetworkState> {
        Ok(self.mode()?.state)
    }

    /// The address the interface currently uses.
    pub fn current_address(&self) -> Result<MacAddress> {
        Ok(self.mode()?.current_address)
    }

    /// Number of meaningful bytes in the interface's addresses.
    pub fn address_size(&self) -> Result<usize> {
        Ok(self.mode()?.hw_address_size as usize)
    }

    /// Whether media is present. [None] when the interface cannot tell.
    pub fn media_present(&self) -> Result<Option<bool>> {
        let mode = self.mode()?;
        if mode.media_present_supported == 0 {
            return Ok(None);
        }
        Ok(Some(mode.media_present != 0))
    }

    /// Fail with `NOT_READY` unless the interface is initialized.
    fn ensure_initialized(&self) -> Result<()> {
        let state = self.state()?;
        if state != NetworkState::INITIALIZED {
            return Err(fail(Status::NOT_READY, "network interface is not initialized"))
                .with_context(|| format!("network interface is {}", state));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let start = require(self.table().start, "Start")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { start(self.this()) };
        check(status).context("unable to start network interface")?;
        Ok(())
    }

    /// Bring the interface to the initialized state, starting it first if needed.
    pub fn initialize(&mut self) -> Result<()> {
        let state = self.state()?;
        match state {
            NetworkState::INITIALIZED => {
                debug!("network interface already initialized");
                return Ok(());
            }
            NetworkState::STOPPED => self.start()?,
            NetworkState::STARTED => {}
            other => {
                warn!("network interface is in state {}, leaving it alone", other);
                return Ok(());
            }
        }

        let initialize = require(self.table().initialize, "Initialize")?;
        // No extra buffer space is requested from the driver.
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { initialize(self.this(), 0, 0) };
        check(status).context("unable to initialize network interface")?;
        info!("network interface initialized");
        Ok(())
    }

    /// Queue `data` for transmission.
    ///
    /// The buffer must already carry its media header: the header size is passed as
    /// zero, which leaves the source address default and the EtherType IPv4.
    pub fn transmit(&mut self, data: &[u8], destination: Option<&MacAddress>) -> Result<()> {
        self.ensure_initialized()?;
        let transmit = require(self.table().transmit, "Transmit")?;

        let protocol = ETHER_TYPE_IPV4;
        let destination = destination.map_or(ptr::null(), |address| address as *const MacAddress);
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe {
            transmit(
                self.this(),
                0,
                data.len(),
                data.as_ptr().cast(),
                ptr::null(),
                destination,
                &protocol,
            )
        };
        check(status).context("unable to transmit packet")?;
        debug!("queued {} byte packet for transmission", data.len());
        Ok(())
    }

    /// Receive one packet into `buffer`.
    pub fn receive(&mut self, buffer: &mut [u8]) -> Result<ReceivedPacket> {
        self.ensure_initialized()?;
        let receive = require(self.table().receive, "Receive")?;

        let mut header_size = 0;
        let mut length = buffer.len();
        let mut source = MacAddress::default();
        let mut destination = MacAddress::default();
        let mut protocol = 0u16;
        // SAFETY: All pointers are valid for the duration of the call.
        let status = unsafe {
            receive(
                self.this(),
                &mut header_size,
                &mut length,
                buffer.as_mut_ptr().cast(),
                &mut source,
                &mut destination,
                &mut protocol,
            )
        };
        check(status).context("unable to receive packet")?;

        Ok(ReceivedPacket {
            length: length.min(buffer.len()),
            header_size,
            source,
            destination,
            protocol,
        })
    }

    /// Enable and disable receive filters.
    pub fn set_receive_filters(&mut self, enable: ReceiveFilters, disable: ReceiveFilters) -> Result<()> {
        let receive_filters = require(self.table().receive_filters, "ReceiveFilters")?;
        // SAFETY: No multicast list is passed.
        let status = unsafe { receive_filters(self.this(), enable, disable, false, 0, ptr::null()) };
        check(status).context("unable to set receive filters")?;
        Ok(())
    }

    /// Read the interface counters, clearing them afterwards when `reset` is set.
    pub fn statistics(&mut self, reset: bool) -> Result<NetworkStatistics> {
        let statistics = require(self.table().statistics, "Statistics")?;

        let mut table = NetworkStatistics::default();
        let mut size = size_of::<NetworkStatistics>();
        // SAFETY: `table` is valid for `size` bytes of writes.
        let status = unsafe { statistics(self.this(), reset, &mut size, &mut table) };
        check(status).context("unable to read network statistics")?;
        Ok(table)
    }

    /// Return the interface from initialized to started.
    pub fn shutdown(&mut self) -> Result<()> {
        let shutdown = require(self.table().shutdown, "Shutdown")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { shutdown(self.this()) };
        check(status).context("unable to shut down network interface")?;
        Ok(())
    }

    /// Return the interface from started to stopped.
    pub fn stop(&mut self) -> Result<()> {
        let stop = require(self.table().stop, "Stop")?;
        // SAFETY: Plain call through the protocol table.
        let status = unsafe { stop(self.this()) };
        check(status).context("unable to stop network interface")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::status_of;
    use crate::testing::{self, FakeFirmware};
    use core::cell::{Cell, RefCell};
    use core::mem::offset_of;
    use std::collections::VecDeque;

    const STATION: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
    const PEER: [u8; 6] = [0x52, 0x54, 0x00, 0xab, 0xcd, 0xef];

    thread_local! {
        static SENT: RefCell<Vec<(Vec<u8>, usize, Option<MacAddress>, u16)>> = const { RefCell::new(Vec::new()) };
        static INBOX: RefCell<VecDeque<Vec<u8>>> = const { RefCell::new(VecDeque::new()) };
        static STARTS: Cell<usize> = const { Cell::new(0) };
    }

    /// A network interface. The protocol table comes first so that `this` can be cast
    /// back to the whole interface.
    #[repr(C)]
    struct FakeNic {
        table: SimpleNetworkProtocol,
        mode: SimpleNetworkMode,
        statistics: NetworkStatistics,
    }

    unsafe fn nic(this: *mut SimpleNetworkProtocol) -> &'static mut FakeNic {
        unsafe { &mut *this.cast::<FakeNic>() }
    }

    unsafe extern "efiapi" fn fake_start(this: *mut SimpleNetworkProtocol) -> Status {
        let nic = unsafe { nic(this) };
        if nic.mode.state != NetworkState::STOPPED {
            return Status::ALREADY_STARTED;
        }
        STARTS.set(STARTS.get() + 1);
        nic.mode.state = NetworkState::STARTED;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_stop(this: *mut SimpleNetworkProtocol) -> Status {
        let nic = unsafe { nic(this) };
        if nic.mode.state != NetworkState::STARTED {
            return Status::NOT_STARTED;
        }
        nic.mode.state = NetworkState::STOPPED;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_initialize(
        this: *mut SimpleNetworkProtocol,
        extra_rx_buffer_size: usize,
        extra_tx_buffer_size: usize,
    ) -> Status {
        let nic = unsafe { nic(this) };
        if nic.mode.state != NetworkState::STARTED || extra_rx_buffer_size != 0 || extra_tx_buffer_size != 0 {
            return Status::NOT_STARTED;
        }
        nic.mode.state = NetworkState::INITIALIZED;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_shutdown(this: *mut SimpleNetworkProtocol) -> Status {
        let nic = unsafe { nic(this) };
        nic.mode.state = NetworkState::STARTED;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_receive_filters(
        this: *mut SimpleNetworkProtocol,
        enable: ReceiveFilters,
        disable: ReceiveFilters,
        _reset_mcast_filter: bool,
        _mcast_filter_count: usize,
        _mcast_filter: *const MacAddress,
    ) -> Status {
        let mode = &mut unsafe { nic(this) }.mode;
        if !mode.receive_filter_mask.contains(enable) {
            return Status::INVALID_PARAMETER;
        }
        mode.receive_filter_setting = (mode.receive_filter_setting | enable) - disable;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_statistics(
        this: *mut SimpleNetworkProtocol,
        reset: bool,
        statistics_size: *mut usize,
        statistics_table: *mut NetworkStatistics,
    ) -> Status {
        let nic = unsafe { nic(this) };
        unsafe {
            if *statistics_size < size_of::<NetworkStatistics>() {
                *statistics_size = size_of::<NetworkStatistics>();
                return Status::BUFFER_TOO_SMALL;
            }
            *statistics_table = nic.statistics;
        }
        if reset {
            nic.statistics = NetworkStatistics::default();
        }
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_transmit(
        this: *mut SimpleNetworkProtocol,
        header_size: usize,
        buffer_size: usize,
        buffer: *const c_void,
        source_address: *const MacAddress,
        destination_address: *const MacAddress,
        protocol: *const u16,
    ) -> Status {
        let nic = unsafe { nic(this) };
        if !source_address.is_null() {
            return Status::INVALID_PARAMETER;
        }
        let data = unsafe { core::slice::from_raw_parts(buffer.cast::<u8>(), buffer_size) }.to_vec();
        let destination = unsafe { destination_address.as_ref() }.copied();
        let protocol = unsafe { *protocol };
        SENT.with_borrow_mut(|sent| sent.push((data, header_size, destination, protocol)));
        nic.statistics.tx_total_frames += 1;
        nic.statistics.tx_total_bytes += buffer_size as u64;
        Status::SUCCESS
    }

    unsafe extern "efiapi" fn fake_receive(
        this: *mut SimpleNetworkProtocol,
        header_size: *mut usize,
        buffer_size: *mut usize,
        buffer: *mut c_void,
        source_address: *mut MacAddress,
        destination_address: *mut MacAddress,
        protocol: *mut u16,
    ) -> Status {
        let nic = unsafe { nic(this) };
        let Some(frame) = INBOX.with_borrow_mut(VecDeque::pop_front) else {
            return Status::NOT_READY;
        };
        unsafe {
            if *buffer_size < frame.len() {
                *buffer_size = frame.len();
                INBOX.with_borrow_mut(|inbox| inbox.push_front(frame));
                return Status::BUFFER_TOO_SMALL;
            }
            buffer.cast::<u8>().copy_from(frame.as_ptr(), frame.len());
            *buffer_size = frame.len();
            *header_size = 14;
            *destination_address = MacAddress::new(&frame[0..6]);
            *source_address = MacAddress::new(&frame[6..12]);
            *protocol = u16::from_be_bytes([frame[12], frame[13]]);
        }
        nic.statistics.rx_total_frames += 1;
        Status::SUCCESS
    }

    /// Register a fake interface in `state`.
    fn interface(_fake: &FakeFirmware, state: NetworkState) -> Box<FakeNic> {
        // SAFETY: The mode record is plain integers and byte arrays.
        let mut mode: SimpleNetworkMode = unsafe { core::mem::zeroed() };
        mode.state = state;
        mode.hw_address_size = 6;
        mode.media_header_size = 14;
        mode.max_packet_size = 1500;
        mode.receive_filter_mask = ReceiveFilters::UNICAST | ReceiveFilters::BROADCAST;
        mode.current_address = MacAddress::new(&STATION);
        mode.permanent_address = MacAddress::new(&STATION);
        mode.broadcast_address = MacAddress::new(&[0xff; 6]);
        mode.media_present_supported = 1;
        mode.media_present = 1;

        let mut nic = Box::new(FakeNic {
            table: SimpleNetworkProtocol {
                revision: 0x0001_0000,
                start: Some(fake_start),
                stop: Some(fake_stop),
                initialize: Some(fake_initialize),
                reset: 0,
                shutdown: Some(fake_shutdown),
                receive_filters: Some(fake_receive_filters),
                station_address: 0,
                statistics: Some(fake_statistics),
                mcast_ip_to_mac: 0,
                nv_data: 0,
                get_status: 0,
                transmit: Some(fake_transmit),
                receive: Some(fake_receive),
                wait_for_packet: ptr::null_mut(),
                mode: ptr::null_mut(),
            },
            mode,
            statistics: NetworkStatistics::default(),
        });
        nic.table.mode = &mut nic.mode;
        let this: *mut SimpleNetworkProtocol = &mut nic.table;
        testing::register(SimpleNetworkProtocol::GUID, 0x400 as uefi_raw::Handle, this.cast());
        nic
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&STATION);
        frame.extend_from_slice(&PEER);
        frame.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn layouts_match_published_offsets() {
        assert_eq!(size_of::<MacAddress>(), 32);
        assert_eq!(offset_of!(SimpleNetworkMode, mcast_filter), 40);
        assert_eq!(offset_of!(SimpleNetworkMode, current_address), 552);
        assert_eq!(offset_of!(SimpleNetworkMode, if_type), 648);
        assert_eq!(offset_of!(SimpleNetworkMode, media_present), 652);
        assert_eq!(size_of::<SimpleNetworkMode>(), 656);
        assert_eq!(size_of::<NetworkStatistics>(), 26 * 8);
        assert_eq!(offset_of!(SimpleNetworkProtocol, statistics), 64);
        assert_eq!(offset_of!(SimpleNetworkProtocol, transmit), 96);
        assert_eq!(offset_of!(SimpleNetworkProtocol, wait_for_packet), 112);
        assert_eq!(offset_of!(SimpleNetworkProtocol, mode), 120);
    }

    #[test]
    fn formats_addresses_and_states() {
        let address = MacAddress::new(&STATION);
        assert_eq!(address.display(6).to_string(), "52:54:00:12:34:56");
        assert_eq!(address.display(2).to_string(), "52:54");
        assert_eq!(address.display(0).to_string(), "");
        assert_eq!(address.display(64).to_string().len(), 32 * 3 - 1);
        assert_eq!(NetworkState::STARTED.to_string(), "started");
        assert_eq!(NetworkState(7).to_string(), "unknown(7)");
        assert_eq!(ReceiveFilters::PROMISCUOUS_MULTICAST.bits(), 0x10);
    }

    #[test]
    fn reads_mode_fields() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState::STOPPED);
        let network = SimpleNetwork::locate(&fake).unwrap();
        assert_eq!(network.state().unwrap(), NetworkState::STOPPED);
        assert_eq!(network.current_address().unwrap(), MacAddress::new(&STATION));
        assert_eq!(network.address_size().unwrap(), 6);
        assert_eq!(network.media_present().unwrap(), Some(true));
    }

    #[test]
    fn initialize_starts_stopped_interface() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState::STOPPED);
        let mut network = SimpleNetwork::locate(&fake).unwrap();

        network.initialize().unwrap();
        assert_eq!(network.state().unwrap(), NetworkState::INITIALIZED);
        assert_eq!(STARTS.get(), 1);

        // Initializing again does nothing.
        network.initialize().unwrap();
        assert_eq!(STARTS.get(), 1);

        network.shutdown().unwrap();
        assert_eq!(network.state().unwrap(), NetworkState::STARTED);
        network.initialize().unwrap();
        assert_eq!(STARTS.get(), 1);
        assert_eq!(network.state().unwrap(), NetworkState::INITIALIZED);

        network.shutdown().unwrap();
        network.stop().unwrap();
        assert_eq!(network.state().unwrap(), NetworkState::STOPPED);
    }

    #[test]
    fn unknown_state_is_left_alone() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState(9));
        let mut network = SimpleNetwork::locate(&fake).unwrap();
        network.initialize().unwrap();
        assert_eq!(network.state().unwrap(), NetworkState(9));
    }

    #[test]
    fn traffic_requires_initialization() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState::STARTED);
        let mut network = SimpleNetwork::locate(&fake).unwrap();

        let error = network.transmit(b"payload", None).unwrap_err();
        assert_eq!(status_of(&error), Some(Status::NOT_READY));
        let error = network.receive(&mut [0u8; 64]).unwrap_err();
        assert_eq!(status_of(&error), Some(Status::NOT_READY));
        assert!(SENT.with_borrow(Vec::is_empty));
    }

    #[test]
    fn transmits_with_default_header() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState::INITIALIZED);
        let mut network = SimpleNetwork::locate(&fake).unwrap();

        let peer = MacAddress::new(&PEER);
        let packet = frame(b"hello");
        network.transmit(&packet, Some(&peer)).unwrap();
        network.transmit(&packet, None).unwrap();

        SENT.with_borrow(|sent| {
            assert_eq!(sent.len(), 2);
            assert_eq!(sent[0], (packet.clone(), 0, Some(peer), 0x0800));
            assert_eq!(sent[1].2, None);
        });

        let statistics = network.statistics(true).unwrap();
        assert_eq!(statistics.tx_total_frames, 2);
        assert_eq!(statistics.tx_total_bytes, 2 * packet.len() as u64);
        assert_eq!(network.statistics(false).unwrap().tx_total_frames, 0);
    }

    #[test]
    fn receives_packets() {
        let fake = FakeFirmware::new();
        let _nic = interface(&fake, NetworkState::INITIALIZED);
        let mut network = SimpleNetwork::locate(&fake).unwrap();

        let error = network.receive(&mut [0u8; 64]).unwrap_err();
        assert_eq!(status_of(&error), Some(Status::NOT_READY));

        let incoming = frame(&[7u8; 32]);
        INBOX.with_borrow_mut(|inbox| inbox.push_back(incoming.clone()));

        let error = network.receive(&mut [0u8; 16]).unwrap_err();
        assert_eq!(status_of(&error), Some(Status::BUFFER_TOO_SMALL));

        let mut buffer = [0u8; 1514];
        let packet = network.receive(&mut buffer).unwrap();
        assert_eq!(packet.length, incoming.len());
        assert_eq!(packet.header_size, 14);
        assert_eq!(packet.source, MacAddress::new(&PEER));
        assert_eq!(packet.destination, MacAddress::new(&STATION));
        assert_eq!(packet.protocol, ETHER_TYPE_IPV4);
        assert_eq!(&buffer[..packet.length], incoming.as_slice());
    }

    #[test]
    fn receive_filters_are_forwarded() {
        let fake = FakeFirmware::new();
        let nic = interface(&fake, NetworkState::INITIALIZED);
        let mut network = SimpleNetwork::locate(&fake).unwrap();

        network
            .set_receive_filters(ReceiveFilters::UNICAST | ReceiveFilters::BROADCAST, ReceiveFilters::empty())
            .unwrap();
        assert_eq!(
            nic.mode.receive_filter_setting,
            ReceiveFilters::UNICAST | ReceiveFilters::BROADCAST
        );

        let error = network
            .set_receive_filters(ReceiveFilters::PROMISCUOUS, ReceiveFilters::empty())
            .unwrap_err();
        assert_eq!(status_of(&error), Some(Status::INVALID_PARAMETER));
    }

    #[test]
    fn missing_mode_is_not_ready() {
        let fake = FakeFirmware::new();
        let mut nic = interface(&fake, NetworkState::INITIALIZED);
        nic.table.mode = ptr::null_mut();
        let network = SimpleNetwork::locate(&fake).unwrap();
        let error = network.state().unwrap_err();
        assert_eq!(status_of(&error), Some(Status::NOT_READY));
    }
}
