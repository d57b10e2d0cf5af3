//! Device access for the GPS Track Pod.
//!
//! This crate owns everything effectful: the [`Transport`] trait with its
//! HID backend, the recording and replay transports used for offline
//! protocol work, the [`Session`] command layer with its retry policy, and
//! the lazily fetching [`MemoryView`] over the device's data region.
//!
//! A session exclusively owns its transport and serialises commands; there
//! is never more than one command in flight.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]

pub mod hid;
pub mod memory;
pub mod pdml;
pub mod pod;
pub mod recorder;
pub mod replay;
pub mod session;
pub mod transport;

pub use memory::MemoryView;
pub use pod::GpsPod;
pub use recorder::RecordingTransport;
pub use replay::{Direction, ReplayLog, ReplayTransport};
pub use session::{PacingConfig, Session};
pub use transport::Transport;

use gpspod_protocol::ProtocolError;
use thiserror::Error;

/// Region offset at which the settings blob lives inside the data file.
pub const SETTINGS_REGION_OFFSET: u32 = 0x2000;

/// Errors from transports, the session and the memory view.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open device: {0}")]
    Open(String),

    #[error("device not found (VID {:#06x}, PID {:#06x})", gpspod_protocol::VENDOR_ID, gpspod_protocol::PRODUCT_ID)]
    NotFound,

    #[error("report write failed: {0}")]
    Write(String),

    #[error("report read failed: {0}")]
    Read(String),

    #[error("read timed out after {0} ms")]
    Timeout(u64),

    #[error("session desynchronised; close and reopen the device")]
    Desync,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("memory read at {offset:#x} returned a chunk for {actual:#x}")]
    MisplacedChunk { offset: u32, actual: u32 },

    #[error("memory read at {offset:#x} returned {actual} bytes, expected {expected}")]
    ShortRead {
        offset: u32,
        expected: u32,
        actual: usize,
    },

    #[error("read of {offset:#x}+{len:#x} crosses the region end ({size:#x})")]
    OutOfRange { offset: u32, len: u32, size: u32 },

    #[error("replay log exhausted")]
    ReplayExhausted,

    #[error("replay mismatch at line {line}: wrote {wrote}, recorded {recorded}")]
    ReplayMismatch {
        line: usize,
        wrote: String,
        recorded: String,
    },

    #[error("malformed recording at line {line}: {reason}")]
    ReplayParse { line: usize, reason: String },

    #[error("recording log I/O failed: {0}")]
    Log(#[from] std::io::Error),
}

impl DeviceError {
    /// Coarse error kind used for user-facing reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(inner) => inner.kind(),
            Self::Desync => "packet",
            Self::OutOfRange { .. } => "usage",
            Self::MisplacedChunk { .. } | Self::ShortRead { .. } => "protocol",
            _ => "transport",
        }
    }

    /// Whether retrying the whole command may clear the error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Protocol(inner) => inner.is_transient(),
            Self::Timeout(_) | Self::Read(_) => true,
            _ => false,
        }
    }
}

/// Convenience result alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
