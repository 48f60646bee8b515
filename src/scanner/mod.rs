//! Bluetooth discovery backends.
//!
//! This module provides a small closed set of discovery backends behind one
//! dispatch function: given a time budget, block for approximately that
//! duration and return the devices observed. Classic inquiry and low-energy
//! scanning disagree on what metadata they can supply, so the fused backend
//! cross-references the two by hardware address.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::device::{DiscoveredDevice, Source};
use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Error type for discovery operations.
#[derive(Error, Debug)]
pub enum DiscoverError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Available discovery backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Classic BR/EDR inquiry via BlueZ D-Bus: name and device class, no RSSI
    #[cfg(feature = "bluer")]
    Classic,
    /// LE scan via BlueZ D-Bus: RSSI and advertised name, no device class
    #[cfg(feature = "bluer")]
    Le,
    /// Raw HCI socket passive LE scan (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
    /// Classic inquiry and LE scan in one cycle, cross-referenced by address
    #[cfg(feature = "bluer")]
    Fused,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Fused;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Classic => write!(f, "classic"),
            #[cfg(feature = "bluer")]
            Backend::Le => write!(f, "le"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(feature = "bluer")]
            Backend::Fused => write!(f, "fused"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "classic" | "bredr" => Ok(Backend::Classic),
            #[cfg(feature = "bluer")]
            "le" | "ble" => Ok(Backend::Le),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            #[cfg(feature = "bluer")]
            "fused" | "combined" => Ok(Backend::Fused),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Discover nearby devices using the specified backend.
///
/// Blocks for approximately `window` (the fused backend runs a classic pass
/// and an LE pass back to back, each with the full window) and returns the
/// devices observed, deduplicated by address and sorted for deterministic
/// output.
pub async fn discover(
    backend: Backend,
    window: Duration,
) -> Result<Vec<DiscoveredDevice>, DiscoverError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Classic => bluer::discover_classic(window).await,
        #[cfg(feature = "bluer")]
        Backend::Le => bluer::discover_le(window).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::discover(window).await,
        #[cfg(feature = "bluer")]
        Backend::Fused => {
            // A failed classic pass degrades to an LE-only cycle instead of
            // aborting; the inquiry is the flakier of the two.
            let classic = match bluer::discover_classic(window).await {
                Ok(devices) => devices,
                Err(e) => {
                    tracing::warn!("classic inquiry failed, continuing with LE only: {e}");
                    Vec::new()
                }
            };
            let le = bluer::discover_le(window).await?;
            Ok(merge_sightings(classic, le))
        }
    }
}

/// Cross-reference LE sightings against a classic scan by hardware address.
///
/// An LE device that was also seen on BR/EDR inherits the classic name and
/// device class while keeping its own signal strength. Devices seen by only
/// one pass are carried through unchanged; the union is returned sorted by
/// address.
pub fn merge_sightings(
    classic: Vec<DiscoveredDevice>,
    le: Vec<DiscoveredDevice>,
) -> Vec<DiscoveredDevice> {
    let mut classic_by_mac: HashMap<MacAddress, DiscoveredDevice> =
        classic.into_iter().map(|d| (d.mac, d)).collect();

    let mut merged: Vec<DiscoveredDevice> = le
        .into_iter()
        .map(|le_device| match classic_by_mac.remove(&le_device.mac) {
            Some(classic_device) => DiscoveredDevice {
                mac: le_device.mac,
                name: classic_device.name.or(le_device.name),
                rssi: le_device.rssi,
                device_class: classic_device.device_class,
                source: Source::Classic,
            },
            None => le_device,
        })
        .collect();

    merged.extend(classic_by_mac.into_values());
    merged.sort_by_key(|d| d.mac.0);
    merged
}
