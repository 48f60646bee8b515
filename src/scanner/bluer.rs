//! BlueZ D-Bus backend for device discovery.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running. Both
//! transports go through the same window-bounded collection loop; only the
//! discovery filter and the metadata kept per device differ.

use super::DiscoverError;
use crate::device::{DiscoveredDevice, Source};
use crate::mac_address::MacAddress;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

impl From<bluer::Error> for DiscoverError {
    fn from(err: bluer::Error) -> Self {
        DiscoverError::Bluetooth(err.to_string())
    }
}

/// Run a classic BR/EDR inquiry for approximately `window`.
///
/// Yields display names and class-of-device bitmasks. BlueZ does not report
/// a usable RSSI for inquiry results.
pub async fn discover_classic(window: Duration) -> Result<Vec<DiscoveredDevice>, DiscoverError> {
    discover_transport(Source::Classic, window).await
}

/// Run an LE scan for approximately `window`.
///
/// Yields signal strength and advertised names. Advertisements carry no
/// class-of-device, so sightings from this pass classify as Unknown unless a
/// fused scan cross-references them.
pub async fn discover_le(window: Duration) -> Result<Vec<DiscoveredDevice>, DiscoverError> {
    discover_transport(Source::LowEnergy, window).await
}

async fn discover_transport(
    source: Source,
    window: Duration,
) -> Result<Vec<DiscoveredDevice>, DiscoverError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let transport = match source {
        Source::Classic => DiscoveryTransport::BrEdr,
        Source::LowEnergy => DiscoveryTransport::Le,
    };
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport,
            duplicate_data: false,
            ..Default::default()
        })
        .await?;

    let mut events = adapter.discover_devices().await?;
    let deadline = Instant::now() + window;
    let mut found: HashMap<MacAddress, DiscoveredDevice> = HashMap::new();

    loop {
        let event = tokio::select! {
            () = sleep_until(deadline) => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let AdapterEvent::DeviceAdded(address) = event {
            match inspect_device(&adapter, address, source).await {
                Ok(device) => record_sighting(&mut found, device),
                // A device vanishing between the event and the property
                // reads is routine; skip it and keep the window open.
                Err(e) => tracing::debug!("skipping device {address}: {e}"),
            }
        }
    }

    let mut devices: Vec<DiscoveredDevice> = found.into_values().collect();
    devices.sort_by_key(|d| d.mac.0);
    Ok(devices)
}

/// Read the metadata BlueZ holds for a freshly discovered device.
async fn inspect_device(
    adapter: &Adapter,
    address: Address,
    source: Source,
) -> Result<DiscoveredDevice, DiscoverError> {
    let device = adapter.device(address)?;

    let name = device.name().await?;
    let rssi = device.rssi().await?;
    // BlueZ caches class-of-device from earlier BR/EDR contact; an LE scan
    // must not report it, the fused backend supplies it by cross-reference.
    let device_class = match source {
        Source::Classic => device.class().await?,
        Source::LowEnergy => None,
    };

    Ok(DiscoveredDevice {
        mac: address.into(),
        name,
        rssi,
        device_class,
        source,
    })
}

/// Collapse duplicate sightings within one window, keeping the stronger
/// signal and the first non-empty name.
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
            if existing.device_class.is_none() {
                existing.device_class = device.device_class;
            }
        }
        None => {
            found.insert(device.mac, device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::base_device;

    const MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn test_address_to_mac_address() {
        let addr = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MAC);
    }

    #[test]
    fn test_record_sighting_keeps_stronger_rssi() {
        let mut found = HashMap::new();

        let mut first = base_device(MAC, Source::LowEnergy);
        first.rssi = Some(-70);
        record_sighting(&mut found, first);

        let mut second = base_device(MAC, Source::LowEnergy);
        second.rssi = Some(-55);
        record_sighting(&mut found, second);

        assert_eq!(found.len(), 1);
        assert_eq!(found[&MAC].rssi, Some(-55));
    }

    #[test]
    fn test_record_sighting_fills_missing_metadata() {
        let mut found = HashMap::new();

        record_sighting(&mut found, base_device(MAC, Source::Classic));

        let mut update = base_device(MAC, Source::Classic);
        update.name = Some("JBL Flip".to_string());
        update.device_class = Some(0x0400);
        record_sighting(&mut found, update);

        assert_eq!(found[&MAC].name.as_deref(), Some("JBL Flip"));
        assert_eq!(found[&MAC].device_class, Some(0x0400));
    }

    #[test]
    fn test_record_sighting_does_not_overwrite_name() {
        let mut found = HashMap::new();

        let mut first = base_device(MAC, Source::LowEnergy);
        first.name = Some("Pixel 7".to_string());
        record_sighting(&mut found, first);

        let mut second = base_device(MAC, Source::LowEnergy);
        second.name = Some("Pixel".to_string());
        record_sighting(&mut found, second);

        assert_eq!(found[&MAC].name.as_deref(), Some("Pixel 7"));
    }
}
