//! Device metadata and report framing constants

use serde::{Deserialize, Serialize};

/// Size of one CTAPHID report in bytes.
pub const REPORT_SIZE: usize = 64;

/// Size of one report as carried on a bridged connection: the 64-byte
/// report prefixed with its 1-byte report id, matching what the host HID
/// API expects on write.
pub const WIRE_REPORT_SIZE: usize = REPORT_SIZE + 1;

/// Identifying attributes of a discovered authentication device.
///
/// A read-only snapshot taken at enumeration time; the `path` is the opaque
/// host-specific identifier used to start a bridging session against the
/// device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Opaque host-specific device path
    pub path: String,
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// HID usage page (0xF1D0 for CTAPHID devices)
    pub usage_page: u16,
    /// HID usage (0x01 for CTAPHID devices)
    pub usage: u16,
    /// Manufacturer string, if the host reports one
    pub manufacturer: Option<String>,
    /// Product string, if the host reports one
    pub product: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_info_cbor_roundtrip() {
        let info = DeviceInfo {
            path: "/dev/hidraw3".to_string(),
            vendor_id: 0x1050,
            product_id: 0x0407,
            usage_page: 0xF1D0,
            usage: 0x01,
            manufacturer: Some("Yubico".to_string()),
            product: Some("YubiKey 5".to_string()),
        };

        let mut bytes = Vec::new();
        ciborium::into_writer(&info, &mut bytes).unwrap();
        let decoded: DeviceInfo = ciborium::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(decoded, info);
    }
}
