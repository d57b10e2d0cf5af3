//! HID-class transport backend.
//!
//! Used where the host OS claims the device's HID interface exclusively.
//! Reports are unnumbered, so writes carry a zero report ID prefix and
//! reads come back as bare packets.

use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::debug;

use gpspod_protocol::{PACKET_LEN, PRODUCT_ID, VENDOR_ID};

use crate::{DeviceError, DeviceResult, Transport};

const REPORT_ID: u8 = 0x00;

pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    /// Open the first matching device and drain any stale reports left in
    /// the delivery queue from a previous session.
    pub fn open() -> DeviceResult<Self> {
        let api = HidApi::new().map_err(|e| DeviceError::Open(e.to_string()))?;
        let device = api
            .open(VENDOR_ID, PRODUCT_ID)
            .map_err(|_| DeviceError::NotFound)?;
        let mut transport = Self { device };
        let drained = transport.drain();
        debug!(drained, "opened HID transport");
        Ok(transport)
    }

    /// Read and discard queued reports; returns how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut buf = [0u8; PACKET_LEN];
        let mut count = 0;
        while matches!(self.device.read_timeout(&mut buf, 10), Ok(n) if n > 0) {
            count += 1;
        }
        count
    }
}

impl Transport for HidTransport {
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()> {
        let mut buf = Vec::with_capacity(report.len() + 1);
        buf.push(REPORT_ID);
        buf.extend_from_slice(report);
        self.device
            .write(&buf)
            .map_err(|e| DeviceError::Write(e.to_string()))?;
        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> DeviceResult<Vec<u8>> {
        let mut buf = [0u8; PACKET_LEN];
        let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
        match self.device.read_timeout(&mut buf, millis) {
            Ok(0) => Err(DeviceError::Timeout(timeout.as_millis() as u64)),
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) => Err(DeviceError::Read(e.to_string())),
        }
    }
}
