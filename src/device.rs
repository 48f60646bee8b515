//! Discovered Bluetooth device data structure.

use crate::mac_address::MacAddress;

/// Discovery mode a sighting came from.
///
/// Classic inquiry can retrieve a display name and class-of-device bitmask
/// but no usable signal strength; low-energy scanning yields signal strength
/// but no class metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Connection-capable BR/EDR inquiry
    Classic,
    /// Passive LE advertisement scanning
    LowEnergy,
}

impl Source {
    /// Display name used when a device advertises no name of its own.
    pub fn fallback_name(self) -> &'static str {
        match self {
            Source::Classic => "BT_Device",
            Source::LowEnergy => "BLE_Device",
        }
    }
}

/// One device observed during a discovery window.
///
/// Ephemeral: instances live for a single scan cycle and are never persisted.
/// The raw address leaves this struct only as a keyed pseudonym.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    /// Hardware address of the device
    pub mac: MacAddress,
    /// Advertised or inquiry-provided display name, if any
    pub name: Option<String>,
    /// Signal strength in dBm; classic inquiry does not report one
    pub rssi: Option<i16>,
    /// Class-of-device bitmask; only classic inquiry provides it
    pub device_class: Option<u32>,
    /// Which discovery mode produced this sighting
    pub source: Source,
}

impl DiscoveredDevice {
    /// Display name with the per-source fallback applied.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.source.fallback_name())
    }
}
