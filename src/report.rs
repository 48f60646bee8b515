//! Report records and submission to the collection endpoint.
//!
//! One [`Report`] is submitted per discovered device per cycle. Submission is
//! best-effort and fire-and-forget: a failed record is logged by the caller
//! and never retried, and the outcome of each submission is returned
//! explicitly so tests can assert per-record behavior without scraping logs.

use crate::class::DeviceCategory;
use crate::device::DiscoveredDevice;
use crate::pseudonym::pseudonymize;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Signal strength substituted when a discovery mode reports none.
/// Classic inquiry yields no RSSI.
pub const DEFAULT_SIGNAL_STRENGTH: i16 = -60;

/// Per-request timeout for endpoint submissions.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire record for one device sighting.
///
/// The `mac` field carries the keyed pseudonym, never the raw address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Pseudonym derived from the hardware address and the shared secret
    pub mac: String,
    /// Display label: `"<name> (<category>)"`
    pub name: String,
    /// Signal strength in dBm (placeholder when the radio reported none)
    pub rssi: i16,
    /// Static location label of the reporting scanner
    pub location: String,
    /// Coarse device category label
    pub major_class: String,
}

impl Report {
    /// Build the wire record for a sighting.
    ///
    /// Pseudonymizes the address, classifies the device and applies the
    /// display-name and signal-strength fallbacks.
    pub fn from_device(device: &DiscoveredDevice, secret: &str, location: &str) -> Self {
        let category = DeviceCategory::classify(device.device_class);
        Report {
            mac: pseudonymize(device.mac, secret),
            name: format!("{} ({})", device.display_name(), category),
            rssi: device.rssi.unwrap_or(DEFAULT_SIGNAL_STRENGTH),
            location: location.to_string(),
            major_class: category.as_str().to_string(),
        }
    }
}

/// Errors returned for a single submission attempt.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Failed to construct the HTTP client
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    /// Endpoint answered with a non-success status
    #[error("endpoint returned status {code}")]
    Status { code: u16 },
    /// Connection or protocol level failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Convenience alias for per-record submission outcomes.
pub type SubmitResult = Result<(), ReportError>;

/// Destination for reports, abstracted to enable deterministic unit tests
/// without a network endpoint.
pub trait ReportSink: Send + Sync {
    fn submit(&self, report: &Report) -> Pin<Box<dyn Future<Output = SubmitResult> + Send + '_>>;
}

/// HTTP sink that POSTs each report as a JSON body to a fixed endpoint.
///
/// Any 2xx response counts as accepted; everything else is an error for that
/// record only. No retry, no backoff, no queueing.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: Url) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReportError::Client(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

impl ReportSink for HttpSink {
    fn submit(&self, report: &Report) -> Pin<Box<dyn Future<Output = SubmitResult> + Send + '_>> {
        // Serialize into the request before entering the future so the
        // borrow of `report` does not outlive this call.
        let request = self.client.post(self.endpoint.clone()).json(report);
        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| ReportError::Transport(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(ReportError::Status {
                    code: status.as_u16(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Source;
    use crate::test_utils::{TEST_MAC, base_device};

    #[test]
    fn test_from_device_classic() {
        let mut device = base_device(TEST_MAC, Source::Classic);
        device.name = Some("ThinkPad".to_string());
        device.device_class = Some(0x0104);

        let report = Report::from_device(&device, "s3cr3t", "Room_B");

        assert_eq!(report.mac, "8a839255da2d");
        assert_eq!(report.name, "ThinkPad (Computer)");
        assert_eq!(report.rssi, DEFAULT_SIGNAL_STRENGTH);
        assert_eq!(report.location, "Room_B");
        assert_eq!(report.major_class, "Computer");
    }

    #[test]
    fn test_from_device_low_energy() {
        let mut device = base_device(TEST_MAC, Source::LowEnergy);
        device.rssi = Some(-48);

        let report = Report::from_device(&device, "s3cr3t", "Room_B");

        assert_eq!(report.name, "BLE_Device (Unknown)");
        assert_eq!(report.rssi, -48);
        assert_eq!(report.major_class, "Unknown");
    }

    #[test]
    fn test_raw_address_never_appears_in_record() {
        let device = base_device(TEST_MAC, Source::LowEnergy);
        let report = Report::from_device(&device, "s3cr3t", "Room_B");
        let json = serde_json::to_string(&report).unwrap();

        assert!(!json.contains("AA:BB:CC:DD:EE:FF"));
        assert!(!json.contains("aabbccddeeff"));
        assert!(!json.contains("s3cr3t"));
    }

    #[test]
    fn test_wire_shape() {
        let report = Report {
            mac: "8a839255da2d".to_string(),
            name: "Pixel 7 (Phone)".to_string(),
            rssi: -52,
            location: "Room_B".to_string(),
            major_class: "Phone".to_string(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "mac": "8a839255da2d",
                "name": "Pixel 7 (Phone)",
                "rssi": -52,
                "location": "Room_B",
                "major_class": "Phone",
            })
        );
    }

    #[test]
    fn test_http_sink_construction() {
        let endpoint: Url = "http://127.0.0.1:3000/api/device-log".parse().unwrap();
        assert!(HttpSink::new(endpoint).is_ok());
    }

    #[test]
    fn test_report_error_display() {
        let err = ReportError::Status { code: 500 };
        assert_eq!(format!("{}", err), "endpoint returned status 500");

        let err = ReportError::Transport("connection refused".to_string());
        assert_eq!(format!("{}", err), "transport error: connection refused");
    }
}
