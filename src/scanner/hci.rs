//! Raw HCI socket backend for LE discovery.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges. Advertising reports are
//! parsed directly: address, signal strength and the local-name AD
//! structures are all this transport can supply.

use super::DiscoverError;
use crate::device::{DiscoveredDevice, Source};
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::time::{Instant, sleep_until};

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

// AD types
const AD_TYPE_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_TYPE_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Scan Parameters command
#[repr(C, packed)]
struct LeSetScanParametersCmd {
    scan_type: u8,
    interval: u16,
    window: u16,
    own_address_type: u8,
    filter_policy: u8,
}

/// LE Set Scan Enable command
#[repr(C, packed)]
struct LeSetScanEnableCmd {
    enable: u8,
    filter_dup: u8,
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.push((opcode & 0xFF) as u8);
    packet.push((opcode >> 8) as u8);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, DiscoverError> {
    // Create a raw Bluetooth HCI socket using libc directly
    // since nix doesn't support BTPROTO_HCI
    // SOCK_NONBLOCK is required for AsyncFd to work properly
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(DiscoverError::Bluetooth(format!(
            "Failed to create HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), DiscoverError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(DiscoverError::Bluetooth(format!(
            "Failed to bind HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Set HCI socket filter
fn set_hci_filter(fd: &OwnedFd) -> Result<(), DiscoverError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(DiscoverError::Bluetooth(format!(
            "Failed to set HCI filter: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Send an HCI command
fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> Result<(), DiscoverError> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(DiscoverError::Bluetooth(format!(
            "Failed to send HCI command: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Configure LE scanning parameters and enable scanning
fn enable_le_scan(fd: &OwnedFd) -> Result<(), DiscoverError> {
    // Set scan parameters: passive scan, 10ms interval, 10ms window
    let params = LeSetScanParametersCmd {
        scan_type: LE_SCAN_PASSIVE,
        interval: 0x0010, // 10ms in 0.625ms units
        window: 0x0010,   // 10ms in 0.625ms units
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_ACCEPT_ALL,
    };

    let params_bytes = unsafe {
        std::slice::from_raw_parts(
            &params as *const LeSetScanParametersCmd as *const u8,
            mem::size_of::<LeSetScanParametersCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, params_bytes);
    send_hci_command(fd, &packet)?;

    set_le_scan_enabled(fd, true)
}

/// Toggle LE scanning on or off.
fn set_le_scan_enabled(fd: &OwnedFd, enabled: bool) -> Result<(), DiscoverError> {
    let enable = LeSetScanEnableCmd {
        enable: u8::from(enabled),
        filter_dup: 0x00, // Don't filter duplicates, repeats refresh RSSI
    };

    let enable_bytes = unsafe {
        std::slice::from_raw_parts(
            &enable as *const LeSetScanEnableCmd as *const u8,
            mem::size_of::<LeSetScanEnableCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, enable_bytes);
    send_hci_command(fd, &packet)
}

/// Extract the advertised local name from AD structures, preferring the
/// complete name over the shortened one.
fn parse_local_name(ad_data: &[u8]) -> Option<String> {
    let mut shortened = None;
    let mut offset = 0;

    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        let payload = &ad_data[offset + 2..offset + 1 + len];

        match ad_type {
            AD_TYPE_COMPLETE_LOCAL_NAME => {
                return Some(String::from_utf8_lossy(payload).into_owned());
            }
            AD_TYPE_SHORTENED_LOCAL_NAME => {
                shortened = Some(String::from_utf8_lossy(payload).into_owned());
            }
            _ => {}
        }

        offset += 1 + len;
    }

    shortened
}

/// Parse one LE advertising report event into a sighting.
///
/// Layout after the 4-byte HCI header (packet type, event code, parameter
/// length, subevent): num_reports, then per report event_type(1),
/// addr_type(1), addr(6, little-endian), data_len(1), data, rssi(1).
/// Only the first report is taken; controllers batch rarely and repeats
/// refresh the same device anyway.
fn parse_advertising_report(data: &[u8]) -> Option<DiscoveredDevice> {
    // Minimum size for an advertising report
    if data.len() < 12 {
        return None;
    }

    let report = &data[4..];

    let num_reports = report[0] as usize;
    if num_reports == 0 {
        return None;
    }

    // Skip: num_reports(1) + event_type(1) + addr_type(1)
    if report.len() < 10 {
        return None;
    }

    // Extract address (6 bytes, in reverse order)
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&report[3..9]);
    addr.reverse(); // HCI uses little-endian address

    let data_len = report[9] as usize;
    if report.len() < 10 + data_len + 1 {
        return None;
    }

    let ad_data = &report[10..10 + data_len];
    let rssi = report[10 + data_len] as i8;
    // 127 means "RSSI not available" per the HCI spec
    let rssi = (rssi != 127).then_some(i16::from(rssi));

    Some(DiscoveredDevice {
        mac: MacAddress(addr),
        name: parse_local_name(ad_data),
        rssi,
        device_class: None,
        source: Source::LowEnergy,
    })
}

/// Merge a repeat sighting into the window's accumulator: strongest signal
/// wins, the first advertised name sticks.
fn record_sighting(found: &mut HashMap<MacAddress, DiscoveredDevice>, device: DiscoveredDevice) {
    match found.get_mut(&device.mac) {
        Some(existing) => {
            if existing.name.is_none() {
                existing.name = device.name;
            }
            existing.rssi = match (existing.rssi, device.rssi) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        None => {
            found.insert(device.mac, device);
        }
    }
}

/// Discover devices with a passive LE scan over a raw HCI socket.
///
/// Opens the socket, enables scanning, collects advertising reports until
/// the window closes, then disables scanning and returns the deduplicated
/// sightings sorted by address.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn discover(window: Duration) -> Result<Vec<DiscoveredDevice>, DiscoverError> {
    // Open and configure HCI socket for receiving events
    let fd = open_hci_socket()?;
    bind_hci_socket(&fd, 0)?; // Bind to hci0 to receive advertising events
    set_hci_filter(&fd)?;

    // We need a separate socket for sending commands (bound to specific device)
    let cmd_fd = open_hci_socket()?;
    bind_hci_socket(&cmd_fd, 0)?; // Bind to hci0
    enable_le_scan(&cmd_fd)?;

    // Wrap in AsyncFd for async I/O
    let async_fd = AsyncFd::new(fd)
        .map_err(|e| DiscoverError::Bluetooth(format!("Failed to create async fd: {}", e)))?;

    let deadline = Instant::now() + window;
    let mut found: HashMap<MacAddress, DiscoveredDevice> = HashMap::new();
    let mut buf = [0u8; 258]; // Max HCI event size

    'window: loop {
        // Wait for the socket to be readable, bounded by the window
        let mut guard = tokio::select! {
            () = sleep_until(deadline) => break 'window,
            guard = async_fd.readable() => match guard {
                Ok(guard) => guard,
                Err(_) => break 'window,
            },
        };

        // Drain all available packets before waiting again
        loop {
            let n = match guard.try_io(|inner| {
                let ret = unsafe {
                    libc::read(
                        inner.as_raw_fd(),
                        buf.as_mut_ptr() as *mut c_void,
                        buf.len(),
                    )
                };
                if ret < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(ret as usize)
                }
            }) {
                Ok(Ok(n)) if n > 0 => n,
                Ok(Ok(_)) => break 'window, // EOF
                Ok(Err(_)) => break 'window, // Read error
                Err(_) => break,             // WouldBlock - no more data
            };

            // Check if this is an LE advertising report
            if n >= 4
                && buf[0] == HCI_EVENT_PKT
                && buf[1] == EVT_LE_META_EVENT
                && buf[3] == EVT_LE_ADVERTISING_REPORT
                && let Some(device) = parse_advertising_report(&buf[..n])
            {
                record_sighting(&mut found, device);
            }
        }
    }

    // Leaving the scan running would drain the controller for other users
    if let Err(e) = set_le_scan_enabled(&cmd_fd, false) {
        tracing::debug!("failed to disable LE scan: {e}");
    }

    let mut devices: Vec<DiscoveredDevice> = found.into_values().collect();
    devices.sort_by_key(|d| d.mac.0);
    Ok(devices)
}
