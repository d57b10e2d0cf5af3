//! Synthetic region images.
//!
//! Builds in-memory images laid out exactly like the device's data region:
//! top-level block headers at their fixed offsets and doubly-linked entry
//! blocks behind them. The test suites and the replay tooling use these to
//! exercise the decoders without hardware; nothing here writes to a device.

use crate::block::{BlockHeader, EntryBlockHeader, BLOCK_HEADER_LEN, ENTRY_HEADER_LEN};
use crate::records;
use crate::{ENTRY_BLOCK_SIZE, LOG_BLOCK_OFFSET, REGION_SIZE, TRACK_BLOCK_OFFSET};

/// Frame a record: `u16` length, tag, payload.
pub fn frame_record(tag: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 1) as u16;
    let mut out = Vec::with_capacity(2 + payload.len() + 1);
    out.extend_from_slice(&length.to_le_bytes());
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

/// Pack framed records into a doubly-linked entry-block chain.
///
/// Blocks are placed back to back starting right behind the top-level
/// header, exactly like the device lays them out. Records never straddle
/// blocks: one that does not fit starts the next block and `last_written`
/// excludes the padding.
fn write_chain(image: &mut [u8], top_offset: u32, records: &[Vec<u8>]) {
    let first_block = top_offset + BLOCK_HEADER_LEN;
    let body_capacity = ENTRY_BLOCK_SIZE as usize - ENTRY_HEADER_LEN as usize;

    // Group records into block bodies.
    let mut bodies: Vec<Vec<u8>> = vec![Vec::new()];
    for record in records {
        assert!(
            record.len() <= body_capacity,
            "record of {} bytes cannot fit an entry block",
            record.len()
        );
        if bodies
            .last()
            .map(|body| body.len() + record.len() > body_capacity)
            .unwrap_or(true)
        {
            bodies.push(Vec::new());
        }
        if let Some(body) = bodies.last_mut() {
            body.extend_from_slice(record);
        }
    }

    let count = bodies.len() as u32;
    let offset_of = |index: u32| first_block + index * ENTRY_BLOCK_SIZE;

    for (index, body) in bodies.iter().enumerate() {
        let index = index as u32;
        let base = offset_of(index);
        let header = EntryBlockHeader {
            prev: if index == 0 { base } else { offset_of(index - 1) },
            next: if index + 1 == count { base } else { offset_of(index + 1) },
            first_entry: ENTRY_HEADER_LEN,
            last_written: ENTRY_HEADER_LEN + body.len() as u16,
        };
        let base = base as usize;
        image[base..base + ENTRY_HEADER_LEN as usize].copy_from_slice(&header.encode());
        image[base + ENTRY_HEADER_LEN as usize..base + ENTRY_HEADER_LEN as usize + body.len()]
            .copy_from_slice(body);
    }

    let newest = offset_of(count - 1);
    let last_len = bodies.last().map(Vec::len).unwrap_or(0) as u32;
    let top = BlockHeader {
        newest,
        oldest: first_block,
        blocks: if records.is_empty() { 0 } else { count },
        tail: newest + u32::from(ENTRY_HEADER_LEN) + last_len,
        wraps: 0,
    };
    let top_offset = top_offset as usize;
    image[top_offset..top_offset + BLOCK_HEADER_LEN as usize].copy_from_slice(&top.encode());
}

/// Builder for a complete region image.
pub struct ImageBuilder {
    track_records: Vec<Vec<u8>>,
    log_records: Vec<Vec<u8>>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            track_records: Vec::new(),
            log_records: Vec::new(),
        }
    }

    /// Framed records for the track chain.
    pub fn track_records(mut self, records: Vec<Vec<u8>>) -> Self {
        self.track_records = records;
        self
    }

    /// Framed records for the internal event-log chain.
    pub fn log_records(mut self, records: Vec<Vec<u8>>) -> Self {
        self.log_records = records;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; REGION_SIZE as usize];
        write_chain(&mut image, LOG_BLOCK_OFFSET, &self.log_records);
        write_chain(&mut image, TRACK_BLOCK_OFFSET, &self.track_records);
        image
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Record-level builder for one track, emitting framed records.
pub struct TrackBuilder {
    records: Vec<Vec<u8>>,
    samples: u32,
}

impl TrackBuilder {
    /// Start a track; the header is patched with the final sample count by
    /// [`TrackBuilder::finish`].
    pub fn new(header: records::TrackHeader) -> Self {
        Self {
            records: vec![frame_record(records::TAG_TRACK_HEADER, &header.encode())],
            samples: 0,
        }
    }

    pub fn periodic_header(mut self, layout: &records::PeriodicLayout) -> Self {
        self.records
            .push(frame_record(records::TAG_PERIODIC_HEADER, &layout.encode()));
        self
    }

    pub fn periodic_sample(
        mut self,
        layout: &records::PeriodicLayout,
        values: &records::PeriodicValues,
    ) -> Self {
        self.records.push(frame_record(
            records::TAG_PERIODIC_SAMPLE,
            &layout.encode_sample(values),
        ));
        self.samples += 1;
        self
    }

    pub fn time_reference(mut self, reference: &records::TimeReference) -> Self {
        self.records
            .push(frame_record(records::TAG_TIME_REFERENCE, &reference.encode()));
        self
    }

    pub fn gps_base(mut self, base: &records::GpsBase) -> Self {
        self.records
            .push(frame_record(records::TAG_GPS_BASE, &base.encode()));
        self.samples += 1;
        self
    }

    pub fn gps_small(mut self, delta: &records::GpsSmall) -> Self {
        self.records
            .push(frame_record(records::TAG_GPS_SMALL, &delta.encode()));
        self.samples += 1;
        self
    }

    pub fn gps_large(mut self, delta: &records::GpsLarge) -> Self {
        self.records
            .push(frame_record(records::TAG_GPS_LARGE, &delta.encode()));
        self.samples += 1;
        self
    }

    pub fn lap(mut self, lap: &records::Lap) -> Self {
        self.records.push(frame_record(records::TAG_LAP, &lap.encode()));
        self
    }

    pub fn pause(mut self) -> Self {
        self.records.push(frame_record(records::TAG_PAUSE, &[]));
        self
    }

    /// Patch the header's sample count and return the framed records.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        // samples field lives at payload offset 17; +3 for length and tag.
        let count = self.samples.to_le_bytes();
        self.records[0][3 + 17..3 + 21].copy_from_slice(&count);
        self.records
    }
}
