//! Wire protocol for the Suunto GPS Track Pod.
//!
//! This crate is intentionally I/O-free: it turns command messages into
//! fixed-size transfer packets and back, and gives the command bodies typed
//! encode/parse implementations. Everything here can be tested against
//! recorded traffic without hardware or OS-level HID plumbing.
//!
//! ## Framing
//!
//! A command message is
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | command | `u16` | Command code; replies echo the request's code |
//! | length | `u32` | Body length in bytes |
//! | body | bytes | Command-specific payload |
//! | crc | `u16` | CRC-16 over the body bytes |
//!
//! split across one or more 64-byte packets (see [`packet`]). All integers
//! are little-endian. The CRC variant is CRC-16/IBM-3740 (poly `0x1021`,
//! init `0xFFFF`, unreflected), matching the bytes observed on the wire.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]

pub mod commands;
pub mod crc16;
pub mod message;
pub mod packet;

pub use commands::{
    codes, DeviceInfo, DeviceStatus, DirEntry, MemoryChunk, ReadMemoryRequest, TimeOfDay,
    WriteSettingRequest,
};
pub use message::{decode_message, decode_reply, encode_message};
pub use packet::{packetize, Packet, PacketAssembler, PACKET_LEN, PACKET_TYPE_DATA};

use thiserror::Error;

/// Errors from packet disassembly and message decoding.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("packet shorter than header: {len} bytes")]
    PacketTooShort { len: usize },

    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    #[error("packet payload length {len} exceeds capacity {max}")]
    PacketOverrun { len: usize, max: usize },

    #[error("packet CRC mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    PacketCrc { computed: u16, stored: u16 },

    #[error("sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u8, actual: u8 },

    #[error("packet index out of order: expected {expected}, got {actual}")]
    IndexOutOfOrder { expected: u8, actual: u8 },

    #[error("message truncated: header declares {declared} body bytes, {actual} present")]
    MessageTruncated { declared: usize, actual: usize },

    #[error("message CRC mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    MessageCrc { computed: u16, stored: u16 },

    #[error("unexpected reply code {actual:#06x} to command {expected:#06x}")]
    UnexpectedReply { expected: u16, actual: u16 },

    #[error("malformed {what} body: expected {expected} bytes, got {actual}")]
    BodyLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("device reported status {0:#04x}")]
    DeviceStatus(u8),

    #[error("message of {len} bytes exceeds the {max}-byte transfer limit")]
    MessageTooLarge { len: usize, max: usize },
}

impl ProtocolError {
    /// Coarse error kind used for user-facing reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PacketTooShort { .. }
            | Self::UnknownPacketType(_)
            | Self::PacketOverrun { .. }
            | Self::PacketCrc { .. }
            | Self::SequenceMismatch { .. }
            | Self::IndexOutOfOrder { .. } => "packet",
            Self::DeviceStatus(_) => "device",
            _ => "protocol",
        }
    }

    /// Whether retrying the whole command may clear the error.
    ///
    /// Packet corruption is transient; a sequence mismatch means the session
    /// is desynchronised and must be reopened, and the remaining message
    /// level errors are deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PacketCrc { .. } | Self::PacketTooShort { .. } | Self::IndexOutOfOrder { .. }
        )
    }
}

/// Convenience result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// USB vendor ID of the GPS Track Pod.
pub const VENDOR_ID: u16 = 0x1493;
/// USB product ID of the GPS Track Pod.
pub const PRODUCT_ID: u16 = 0x0020;

/// Largest message the device will accept or produce, header and CRC
/// included. Larger transfers are split at the command layer.
pub const MAX_MESSAGE_SIZE: usize = 0x10000 + message::MESSAGE_OVERHEAD;
