//! On-device storage model for the GPS Track Pod.
//!
//! The device exposes a single 0x3C0000-byte data region. Inside it live two
//! doubly-linked logs of 0x1000-byte entry blocks: the internal event log and
//! the track log. This crate walks those chains over any [`Region`] byte
//! provider (a full dump, or the device crate's lazy memory view), decodes
//! the tagged sample records found in the track chain, and assembles them
//! into [`tracks::Track`]s.
//!
//! Nothing here performs I/O; the only effectful trait is [`Region::read`],
//! which the caller backs however it likes.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]

pub mod block;
pub mod records;
pub mod synth;
pub mod tracks;

pub use block::{read_chain, BlockHeader, ChainStream, EntryBlockHeader};
pub use records::{RawRecord, Record, RecordReader};
pub use tracks::{decode_log_entries, decode_tracks, DecodedTracks, Track, TrackSample};

use thiserror::Error;

/// Total size of the on-device data region.
pub const REGION_SIZE: u32 = 0x3C_0000;
/// Fixed offset of the internal event-log block header.
pub const LOG_BLOCK_OFFSET: u32 = 0x09_27C0;
/// Fixed offset of the track block header.
pub const TRACK_BLOCK_OFFSET: u32 = 0x0F_4240;
/// Size of one entry block, header included.
pub const ENTRY_BLOCK_SIZE: u32 = 0x1000;
/// Magic at the start of every entry block.
pub const ENTRY_BLOCK_MAGIC: [u8; 4] = *b"PMEM";

/// Decode errors over the PMEM region.
///
/// These are deterministic over the same input and are never retried; most
/// carry the absolute region offset of the failure.
#[derive(Error, Debug)]
pub enum PmemError {
    #[error("region fetch failed at {offset:#x}: {source}")]
    Fetch {
        offset: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("range {offset:#x}+{len:#x} outside the {size:#x}-byte region")]
    OutOfRegion { offset: u32, len: u32, size: u32 },

    #[error("entry block at {offset:#x} has bad magic")]
    BadMagic { offset: u32 },

    #[error("entry block at {offset:#x} declares invalid entry range {first:#x}..{last:#x}")]
    BadEntryRange { offset: u32, first: u16, last: u16 },

    #[error("entry-block chain revisits block {offset:#x}")]
    ChainCycle { offset: u32 },

    #[error("entry-block chain exceeds the region's block capacity at {offset:#x}")]
    ChainRunaway { offset: u32 },

    #[error("record at {offset:#x} is truncated")]
    TruncatedRecord { offset: u32 },

    #[error("unknown record tag {tag:#04x} at {offset:#x}")]
    UnknownTag { tag: u8, offset: u32 },

    #[error("record at {offset:#x}: expected {expected} payload bytes, got {actual}")]
    RecordLength {
        offset: u32,
        expected: usize,
        actual: usize,
    },

    #[error("unknown periodic field code {code:#04x} at {offset:#x}")]
    UnknownFieldCode { code: u8, offset: u32 },

    #[error("periodic field {code:#04x} at {offset:#x} declares width {size}, expected {expected}")]
    FieldWidth {
        code: u8,
        offset: u32,
        size: u8,
        expected: u8,
    },

    #[error("periodic sample at {offset:#x} without a preceding periodic header")]
    PeriodicWithoutHeader { offset: u32 },

    #[error("GPS delta at {offset:#x} without a preceding base fix")]
    DeltaWithoutBase { offset: u32 },

    #[error("invalid wall-clock time in record at {offset:#x}")]
    BadTimestamp { offset: u32 },
}

impl PmemError {
    /// Coarse error kind used for user-facing reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "transport",
            _ => "decode",
        }
    }

    /// The absolute region offset the error refers to, when known.
    pub fn offset(&self) -> Option<u32> {
        match self {
            Self::Fetch { offset, .. }
            | Self::OutOfRegion { offset, .. }
            | Self::BadMagic { offset }
            | Self::BadEntryRange { offset, .. }
            | Self::ChainCycle { offset }
            | Self::ChainRunaway { offset }
            | Self::TruncatedRecord { offset }
            | Self::UnknownTag { offset, .. }
            | Self::RecordLength { offset, .. }
            | Self::UnknownFieldCode { offset, .. }
            | Self::FieldWidth { offset, .. }
            | Self::PeriodicWithoutHeader { offset }
            | Self::DeltaWithoutBase { offset }
            | Self::BadTimestamp { offset } => Some(*offset),
        }
    }
}

/// Convenience result alias for PMEM operations.
pub type PmemResult<T> = Result<T, PmemError>;

/// Byte-range access to the data region.
///
/// Implemented by full in-memory dumps here and by the lazy, device-backed
/// memory view in the device crate. Reads are expected to be stable for the
/// lifetime of the provider.
pub trait Region {
    fn read(&mut self, offset: u32, len: u32) -> PmemResult<Vec<u8>>;
}

impl Region for &[u8] {
    fn read(&mut self, offset: u32, len: u32) -> PmemResult<Vec<u8>> {
        let start = offset as usize;
        let end = start + len as usize;
        self.get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(PmemError::OutOfRegion {
                offset,
                len,
                size: self.len() as u32,
            })
    }
}

impl Region for Vec<u8> {
    fn read(&mut self, offset: u32, len: u32) -> PmemResult<Vec<u8>> {
        self.as_slice().read(offset, len)
    }
}
