//! HID device access
//!
//! Wraps the host HID API behind the [`DeviceBackend`]/[`DeviceHandle`]
//! traits so the bridging runtime can be driven by a fake backend in tests.
//! The production backend is [`HidBackend`] over hidapi; device I/O is
//! blocking and runs on dedicated actor threads (see [`actor`]).

pub mod actor;

use protocol::DeviceInfo;
use std::ffi::CString;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// HID usage page assigned to CTAPHID devices.
pub const FIDO_USAGE_PAGE: u16 = 0xF1D0;

/// HID usage assigned to CTAPHID devices.
pub const FIDO_USAGE: u16 = 0x01;

/// Device-level errors. All of them are local to one session or one
/// enumeration request; none of them crosses the session boundary.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open device {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("device read failed: {0}")]
    Read(String),

    #[error("device write failed: {0}")]
    Write(String),

    #[error("device discovery failed: {0}")]
    Discovery(String),
}

/// An exclusively-owned open device.
///
/// Both operations block; a handle lives on one actor thread for its whole
/// session and is released by dropping it.
pub trait DeviceHandle: Send + 'static {
    /// Write one report (report-id byte included) to the device.
    fn write_report(&mut self, data: &[u8]) -> Result<usize, DeviceError>;

    /// Read one report with a bounded timeout. Returns `Ok(0)` when the
    /// timeout expires with no data, which is not an error.
    fn read_report_timeout(&mut self, buf: &mut [u8], timeout: Duration)
    -> Result<usize, DeviceError>;
}

/// Host-side device discovery and opening.
pub trait DeviceBackend: Send + Sync + 'static {
    type Handle: DeviceHandle;

    /// Open the device at `path` exclusively. Busy, missing, and
    /// permission-denied devices all surface here as [`DeviceError::Open`].
    fn open(&self, path: &str) -> Result<Self::Handle, DeviceError>;

    /// Snapshot the currently attached CTAPHID devices, re-querying the
    /// host on every call. Zero matches is an empty list, not an error.
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;
}

/// Keep exactly the CTAPHID interfaces from a host device snapshot,
/// preserving host-reported order.
pub fn filter_fido_devices<I>(devices: I) -> Vec<DeviceInfo>
where
    I: IntoIterator<Item = DeviceInfo>,
{
    devices
        .into_iter()
        .filter(|d| d.usage_page == FIDO_USAGE_PAGE && d.usage == FIDO_USAGE)
        .collect()
}

/// Production backend over hidapi.
///
/// hidapi allows one API instance per process, so the instance is shared
/// and refreshed per enumerate call rather than re-created per actor.
pub struct HidBackend {
    api: Mutex<hidapi::HidApi>,
}

impl HidBackend {
    pub fn new() -> Result<Self, DeviceError> {
        let api = hidapi::HidApi::new().map_err(|e| DeviceError::Discovery(e.to_string()))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }

    fn lock_api(&self) -> Result<std::sync::MutexGuard<'_, hidapi::HidApi>, DeviceError> {
        self.api
            .lock()
            .map_err(|_| DeviceError::Discovery("HID API lock poisoned".to_string()))
    }
}

/// Open hidapi device owned by one actor.
pub struct HidDeviceHandle {
    device: hidapi::HidDevice,
}

impl DeviceHandle for HidDeviceHandle {
    fn write_report(&mut self, data: &[u8]) -> Result<usize, DeviceError> {
        self.device
            .write(data)
            .map_err(|e| DeviceError::Write(e.to_string()))
    }

    fn read_report_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, DeviceError> {
        self.device
            .read_timeout(buf, timeout.as_millis() as i32)
            .map_err(|e| DeviceError::Read(e.to_string()))
    }
}

impl DeviceBackend for HidBackend {
    type Handle = HidDeviceHandle;

    fn open(&self, path: &str) -> Result<Self::Handle, DeviceError> {
        let c_path = CString::new(path).map_err(|e| DeviceError::Open {
            path: path.to_string(),
            reason: format!("invalid device path: {}", e),
        })?;

        let api = self.lock_api()?;
        let device = api.open_path(&c_path).map_err(|e| DeviceError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(HidDeviceHandle { device })
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let mut api = self.lock_api()?;
        api.refresh_devices()
            .map_err(|e| DeviceError::Discovery(e.to_string()))?;

        let snapshot = api.device_list().map(|d| DeviceInfo {
            path: d.path().to_string_lossy().into_owned(),
            vendor_id: d.vendor_id(),
            product_id: d.product_id(),
            usage_page: d.usage_page(),
            usage: d.usage(),
            manufacturer: d.manufacturer_string().map(str::to_string),
            product: d.product_string().map(str::to_string),
        });

        Ok(filter_fido_devices(snapshot))
    }
}
