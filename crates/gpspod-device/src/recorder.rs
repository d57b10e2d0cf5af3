//! Tee transport: persist every exchanged packet to a recording log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::replay::to_hex;
use crate::{DeviceResult, Transport};

/// Wraps another transport and appends every packet to a line-oriented log
/// (see [`crate::replay`] for the format). The log replays later sessions
/// offline, which is how most of this protocol was worked out.
pub struct RecordingTransport<T: Transport> {
    inner: Option<T>,
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl<T: Transport> RecordingTransport<T> {
    pub fn create(inner: T, path: &Path) -> DeviceResult<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(inner, Box::new(file)))
    }

    pub fn from_writer(inner: T, writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Some(inner),
            writer: BufWriter::new(writer),
        }
    }

    pub fn into_inner(mut self) -> T {
        self.inner.take().expect("inner transport already taken")
    }
}

impl<T: Transport> Transport for RecordingTransport<T> {
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()> {
        self.inner
            .as_mut()
            .expect("inner transport already taken")
            .write_report(report)?;
        writeln!(self.writer, "> {}", to_hex(report))?;
        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> DeviceResult<Vec<u8>> {
        let report = self
            .inner
            .as_mut()
            .expect("inner transport already taken")
            .read_report(timeout)?;
        writeln!(self.writer, "< {}", to_hex(&report))?;
        Ok(report)
    }

    fn packet_len(&self) -> usize {
        self.inner
            .as_ref()
            .expect("inner transport already taken")
            .packet_len()
    }
}

impl<T: Transport> Drop for RecordingTransport<T> {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
