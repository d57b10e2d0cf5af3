//! Device facade: a session plus its memory cache.

use gpspod_pmem::{PmemError, Region};

use crate::{DeviceResult, MemoryView, Session, Transport, SETTINGS_REGION_OFFSET};

/// A mounted GPS Track Pod: the command session and the lazy view over its
/// data region. Implements [`Region`], so the PMEM decoders pull bytes
/// straight off the device on demand.
pub struct GpsPod<T: Transport> {
    session: Session<T>,
    memory: MemoryView,
}

impl<T: Transport> GpsPod<T> {
    pub fn new(session: Session<T>) -> Self {
        Self {
            session,
            memory: MemoryView::new(),
        }
    }

    pub fn session(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    /// Read `[offset, offset + len)` of the data region through the cache.
    pub fn read(&mut self, offset: u32, len: u32) -> DeviceResult<Vec<u8>> {
        self.memory.read(&mut self.session, offset, len)
    }

    /// Write a settings range and invalidate the overlapping cache chunks,
    /// so a later read observes the device's view.
    pub fn write_setting(&mut self, offset: u32, bytes: &[u8]) -> DeviceResult<()> {
        self.session.write_setting(offset, bytes)?;
        self.memory
            .invalidate(SETTINGS_REGION_OFFSET + offset, bytes.len() as u32);
        Ok(())
    }
}

impl<T: Transport> Region for GpsPod<T> {
    fn read(&mut self, offset: u32, len: u32) -> Result<Vec<u8>, PmemError> {
        GpsPod::read(self, offset, len).map_err(|error| PmemError::Fetch {
            offset,
            source: Box::new(error),
        })
    }
}
