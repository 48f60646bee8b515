use crate::device::{DiscoveredDevice, Source};
use crate::mac_address::MacAddress;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Build a `DiscoveredDevice` with all optional metadata absent.
///
/// Tests can override just the fields they care about.
pub fn base_device(mac: MacAddress, source: Source) -> DiscoveredDevice {
    DiscoveredDevice {
        mac,
        name: None,
        rssi: None,
        device_class: None,
        source,
    }
}
