//! Lazy, chunk-cached view of the device's data region.

use std::collections::BTreeMap;

use tracing::debug;

use gpspod_pmem::REGION_SIZE;

use crate::{DeviceError, DeviceResult, Session, Transport};

/// Device-preferred read granularity; cache keys align to it.
pub const CHUNK_SIZE: u32 = 512;
/// Cap per ReadMemory command when coalescing missing chunks.
pub const MAX_READ: u32 = 0x8000;

/// Byte-addressable, read-only view of the 0x3C0000-byte region.
///
/// Ranges are fetched on demand in aligned chunks and cached for the life
/// of the session; contiguous missing chunks coalesce into a single read.
/// Reads are idempotent and side-effect-free.
#[derive(Default)]
pub struct MemoryView {
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks currently cached.
    pub fn cached_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Return the exact slice `[offset, offset + len)`.
    pub fn read<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        offset: u32,
        len: u32,
    ) -> DeviceResult<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= REGION_SIZE)
            .ok_or(DeviceError::OutOfRange {
                offset,
                len,
                size: REGION_SIZE,
            })?;
        if len == 0 {
            return Ok(Vec::new());
        }

        self.fetch_missing(session, offset, end)?;

        let mut out = Vec::with_capacity(len as usize);
        let mut at = offset;
        while at < end {
            let base = at - at % CHUNK_SIZE;
            let chunk = self.chunks.get(&base).ok_or(DeviceError::ShortRead {
                offset: base,
                expected: CHUNK_SIZE,
                actual: 0,
            })?;
            let from = (at - base) as usize;
            let to = ((end - base).min(CHUNK_SIZE)) as usize;
            out.extend_from_slice(&chunk[from..to]);
            at = base + CHUNK_SIZE;
        }
        Ok(out)
    }

    /// Drop cached chunks overlapping `[offset, offset + len)`; the next
    /// read fetches them again. Called after settings writes.
    pub fn invalidate(&mut self, offset: u32, len: u32) {
        if len == 0 {
            return;
        }
        let first = offset - offset % CHUNK_SIZE;
        let last = (offset + len - 1) - (offset + len - 1) % CHUNK_SIZE;
        let stale: Vec<u32> = self
            .chunks
            .range(first..=last)
            .map(|(&base, _)| base)
            .collect();
        for base in stale {
            self.chunks.remove(&base);
        }
    }

    /// Fetch every chunk covering `[offset, end)` that is not yet cached,
    /// coalescing contiguous runs up to [`MAX_READ`] per command.
    fn fetch_missing<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        offset: u32,
        end: u32,
    ) -> DeviceResult<()> {
        let first = offset - offset % CHUNK_SIZE;
        let mut pending: Option<(u32, u32)> = None; // (run start, run length)
        let mut base = first;
        while base < end {
            let missing = !self.chunks.contains_key(&base);
            pending = match (missing, pending) {
                (false, Some((start, len))) => {
                    self.fetch(session, start, len)?;
                    None
                }
                (false, None) => None,
                (true, Some((start, len))) if len < MAX_READ => Some((start, len + CHUNK_SIZE)),
                (true, Some((start, len))) => {
                    self.fetch(session, start, len)?;
                    Some((base, CHUNK_SIZE))
                }
                (true, None) => Some((base, CHUNK_SIZE)),
            };
            base += CHUNK_SIZE;
        }
        if let Some((start, len)) = pending {
            self.fetch(session, start, len)?;
        }
        Ok(())
    }

    fn fetch<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        offset: u32,
        len: u32,
    ) -> DeviceResult<()> {
        debug!(
            offset = format_args!("{offset:#x}"),
            len = format_args!("{len:#x}"),
            "fetching region chunk run"
        );
        let data = session.read_memory(offset, len)?;
        if data.len() != len as usize {
            return Err(DeviceError::ShortRead {
                offset,
                expected: len,
                actual: data.len(),
            });
        }
        for (i, chunk) in data.chunks(CHUNK_SIZE as usize).enumerate() {
            self.chunks
                .insert(offset + i as u32 * CHUNK_SIZE, chunk.to_vec());
        }
        Ok(())
    }
}
