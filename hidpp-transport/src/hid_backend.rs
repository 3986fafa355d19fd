//! hidapi-backed raw channel for directly attached devices and
//! receivers.

use std::time::Duration;

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use hidpp_protocol::ReportId;

use crate::dispatcher::RawChannel;
use crate::error::TransportError;

/// Logitech vendor id.
pub const VENDOR_LOGITECH: u16 = 0x046D;

/// The largest report the channel ever reads.
const READ_BUF_SIZE: usize = ReportId::VeryLong.size();

/// One open hidraw node.
pub struct HidRawChannel {
    device: Mutex<Option<HidDevice>>,
    path: String,
}

impl HidRawChannel {
    /// Open the first interface matching `(vendor_id, product_id)`.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        let info = api
            .device_list()
            .find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!(
                    "no HID interface for {vendor_id:04X}:{product_id:04X}"
                ))
            })?;
        let path = info.path().to_string_lossy().into_owned();
        let device = info.open_device(&api)?;
        debug!(%path, "hidraw channel open");
        Ok(Self {
            device: Mutex::new(Some(device)),
            path,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl RawChannel for HidRawChannel {
    async fn write_report(&self, data: &[u8]) -> Result<(), TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::TransportLost)?;
        device.write(data)?;
        Ok(())
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::TransportLost)?;
        let mut buf = [0u8; READ_BUF_SIZE];
        let n = device.read_timeout(&mut buf, timeout.as_millis() as i32)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }

    fn close(&self) {
        // subsequent reads and writes fail with TransportLost
        self.device.lock().take();
    }
}
