//! The transport abstraction.

use std::time::Duration;

use gpspod_protocol::PACKET_LEN;

use crate::DeviceResult;

/// Raw report exchange with the device.
///
/// Implementations own the endpoint exclusively. The report ID byte is the
/// implementation's concern: callers hand over and receive bare packets.
pub trait Transport {
    /// Write one packet to the device.
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()>;

    /// Read one packet, waiting up to `timeout`.
    fn read_report(&mut self, timeout: Duration) -> DeviceResult<Vec<u8>>;

    /// Fixed packet size of this transport.
    fn packet_len(&self) -> usize {
        PACKET_LEN
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()> {
        (**self).write_report(report)
    }

    fn read_report(&mut self, timeout: Duration) -> DeviceResult<Vec<u8>> {
        (**self).read_report(timeout)
    }

    fn packet_len(&self) -> usize {
        (**self).packet_len()
    }
}
