//! Top-level block headers and the entry-block chain walker.

use tracing::{debug, warn};

use crate::{
    PmemError, PmemResult, Region, ENTRY_BLOCK_MAGIC, ENTRY_BLOCK_SIZE, REGION_SIZE,
};

/// Length of a top-level block header.
pub const BLOCK_HEADER_LEN: u32 = 18;
/// Length of an entry-block header.
pub const ENTRY_HEADER_LEN: u16 = 16;

/// Header of one of the two top-level PMEM blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Absolute offset of the current-write (newest) entry block.
    pub newest: u32,
    /// Absolute offset of the oldest retained entry block.
    pub oldest: u32,
    /// Number of entry blocks currently in the chain.
    pub blocks: u32,
    /// Absolute offset one past the last written entry byte.
    pub tail: u32,
    /// Ring wrap counter; zero until the chain overwrites its oldest block.
    pub wraps: u16,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8]) -> PmemResult<Self> {
        if bytes.len() < BLOCK_HEADER_LEN as usize {
            return Err(PmemError::TruncatedRecord { offset: 0 });
        }
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Ok(Self {
            newest: word(0),
            oldest: word(4),
            blocks: word(8),
            tail: word(12),
            wraps: u16::from_le_bytes([bytes[16], bytes[17]]),
        })
    }

    pub fn encode(&self) -> [u8; BLOCK_HEADER_LEN as usize] {
        let mut out = [0u8; BLOCK_HEADER_LEN as usize];
        out[0..4].copy_from_slice(&self.newest.to_le_bytes());
        out[4..8].copy_from_slice(&self.oldest.to_le_bytes());
        out[8..12].copy_from_slice(&self.blocks.to_le_bytes());
        out[12..16].copy_from_slice(&self.tail.to_le_bytes());
        out[16..18].copy_from_slice(&self.wraps.to_le_bytes());
        out
    }
}

/// Header at the start of every entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryBlockHeader {
    /// Absolute offset of the previous (older) block; the block's own offset
    /// at the head of an unwrapped chain.
    pub prev: u32,
    /// Absolute offset of the next (newer) block; the block's own offset at
    /// the tail.
    pub next: u32,
    /// In-block offset of the first valid entry byte.
    pub first_entry: u16,
    /// In-block offset one past the last valid entry byte.
    pub last_written: u16,
}

impl EntryBlockHeader {
    /// Parse and range-check the header of the block based at `offset`.
    pub fn parse(offset: u32, bytes: &[u8]) -> PmemResult<Self> {
        if bytes.len() < ENTRY_HEADER_LEN as usize {
            return Err(PmemError::TruncatedRecord { offset });
        }
        if bytes[0..4] != ENTRY_BLOCK_MAGIC {
            return Err(PmemError::BadMagic { offset });
        }
        let header = Self {
            prev: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            next: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            first_entry: u16::from_le_bytes([bytes[12], bytes[13]]),
            last_written: u16::from_le_bytes([bytes[14], bytes[15]]),
        };
        // Declared offsets are only trusted after range-checking them
        // against the block bounds.
        if header.first_entry < ENTRY_HEADER_LEN
            || u32::from(header.last_written) > ENTRY_BLOCK_SIZE
            || header.first_entry > header.last_written
        {
            return Err(PmemError::BadEntryRange {
                offset,
                first: header.first_entry,
                last: header.last_written,
            });
        }
        Ok(header)
    }

    pub fn encode(&self) -> [u8; ENTRY_HEADER_LEN as usize] {
        let mut out = [0u8; ENTRY_HEADER_LEN as usize];
        out[0..4].copy_from_slice(&ENTRY_BLOCK_MAGIC);
        out[4..8].copy_from_slice(&self.prev.to_le_bytes());
        out[8..12].copy_from_slice(&self.next.to_le_bytes());
        out[12..14].copy_from_slice(&self.first_entry.to_le_bytes());
        out[14..16].copy_from_slice(&self.last_written.to_le_bytes());
        out
    }
}

/// Visit set over entry blocks, one bit per possible block base offset.
struct BlockVisitSet {
    bits: Vec<u64>,
}

impl BlockVisitSet {
    fn new() -> Self {
        let slots = (REGION_SIZE / ENTRY_BLOCK_SIZE) as usize;
        Self {
            bits: vec![0u64; slots.div_ceil(64)],
        }
    }

    /// Mark the block at `offset` visited; returns false if it already was.
    fn insert(&mut self, offset: u32) -> bool {
        let slot = (offset / ENTRY_BLOCK_SIZE) as usize;
        let mask = 1u64 << (slot % 64);
        let word = &mut self.bits[slot / 64];
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        true
    }
}

/// A warning attached to a partially decoded chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWarning {
    /// Absolute region offset of the failure.
    pub offset: u32,
    pub reason: String,
}

impl std::fmt::Display for ChainWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chain truncated at {:#x}: {}", self.offset, self.reason)
    }
}

struct Segment {
    /// Absolute offset of the first body byte in the region.
    region_offset: u32,
    /// Position of that byte in the concatenated stream.
    stream_start: usize,
    len: usize,
}

/// The logical byte stream of one chain: each block's valid body bytes,
/// oldest to newest, concatenated. Records never straddle block boundaries,
/// so the concatenation is record-aligned.
pub struct ChainStream {
    pub bytes: Vec<u8>,
    segments: Vec<Segment>,
    /// Set when the chain broke mid-walk; the stream holds everything up to
    /// the last good block.
    pub warning: Option<ChainWarning>,
}

impl ChainStream {
    /// Map a position in the concatenated stream back to its absolute
    /// region offset.
    pub fn region_offset(&self, pos: usize) -> Option<u32> {
        let segment = self
            .segments
            .iter()
            .take_while(|s| s.stream_start <= pos)
            .last()?;
        if pos < segment.stream_start + segment.len {
            Some(segment.region_offset + (pos - segment.stream_start) as u32)
        } else {
            // One past the end of the stream maps to one past the last body.
            (pos == segment.stream_start + segment.len)
                .then(|| segment.region_offset + segment.len as u32)
        }
    }

    fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            segments: Vec::new(),
            warning: None,
        }
    }
}

/// Walk the entry-block chain anchored at the top-level header at
/// `top_offset` and return its logical byte stream.
///
/// A broken chain (bad magic, out-of-range offset, revisited block)
/// truncates the stream at the last good block and records a warning;
/// everything decoded before the break remains valid. Fetch failures from
/// the underlying region are hard errors.
pub fn read_chain<R: Region>(region: &mut R, top_offset: u32) -> PmemResult<ChainStream> {
    let header_bytes = region.read(top_offset, BLOCK_HEADER_LEN)?;
    let header = BlockHeader::parse(&header_bytes)?;
    debug!(
        top = format_args!("{top_offset:#x}"),
        oldest = format_args!("{:#x}", header.oldest),
        newest = format_args!("{:#x}", header.newest),
        blocks = header.blocks,
        wraps = header.wraps,
        "walking entry-block chain"
    );
    if header.blocks == 0 {
        return Ok(ChainStream::empty());
    }

    let mut stream = ChainStream::empty();
    let mut visited = BlockVisitSet::new();
    let mut current = header.oldest;
    let max_blocks = REGION_SIZE / ENTRY_BLOCK_SIZE;

    fn truncated(error: PmemError, fallback: u32) -> ChainWarning {
        warn!(%error, "entry-block chain truncated");
        ChainWarning {
            offset: error.offset().unwrap_or(fallback),
            reason: error.to_string(),
        }
    }

    for _ in 0..=max_blocks {
        if current.checked_add(ENTRY_BLOCK_SIZE).is_none()
            || current + ENTRY_BLOCK_SIZE > REGION_SIZE
        {
            stream.warning = Some(truncated(
                PmemError::OutOfRegion {
                    offset: current,
                    len: ENTRY_BLOCK_SIZE,
                    size: REGION_SIZE,
                },
                current,
            ));
            return Ok(stream);
        }
        if !visited.insert(current) {
            stream.warning = Some(truncated(PmemError::ChainCycle { offset: current }, current));
            return Ok(stream);
        }

        let header_bytes = region.read(current, u32::from(ENTRY_HEADER_LEN))?;
        let block = match EntryBlockHeader::parse(current, &header_bytes) {
            Ok(block) => block,
            Err(error) => {
                stream.warning = Some(truncated(error, current));
                return Ok(stream);
            }
        };

        let body_len = u32::from(block.last_written - block.first_entry);
        if body_len > 0 {
            let body = region.read(current + u32::from(block.first_entry), body_len)?;
            stream.segments.push(Segment {
                region_offset: current + u32::from(block.first_entry),
                stream_start: stream.bytes.len(),
                len: body.len(),
            });
            stream.bytes.extend_from_slice(&body);
        }

        if current == header.newest || block.next == current {
            if current != header.newest {
                // Self-terminated before reaching the declared newest block.
                stream.warning =
                    Some(truncated(PmemError::ChainCycle { offset: current }, current));
            }
            return Ok(stream);
        }
        current = block.next;
    }

    stream.warning = Some(truncated(PmemError::ChainRunaway { offset: current }, current));
    Ok(stream)
}
