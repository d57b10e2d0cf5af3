//! Session recordings and the replay transport.
//!
//! A recording is a line-oriented text log, one packet per line:
//!
//! ```text
//! > 3f185d10...    packet written to the device
//! < 3f3e5d36...    packet read from the device
//! ```
//!
//! Lines starting with `#` and blank lines are ignored. The replay
//! transport serves `<` lines for reads in order and verifies every write
//! against the next `>` line.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::{DeviceError, DeviceResult, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

/// One recorded exchange, in capture order.
#[derive(Debug, Clone, Default)]
pub struct ReplayLog {
    /// `(source line, direction, packet bytes)`.
    pub entries: Vec<(usize, Direction, Vec<u8>)>,
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub(crate) fn from_hex(text: &str, line: usize) -> DeviceResult<Vec<u8>> {
    if text.len() % 2 != 0 {
        return Err(DeviceError::ReplayParse {
            line,
            reason: "odd number of hex digits".into(),
        });
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| DeviceError::ReplayParse {
                line,
                reason: format!("invalid hex at column {i}"),
            })
        })
        .collect()
}

impl ReplayLog {
    pub fn parse(text: &str) -> DeviceResult<Self> {
        let mut entries = Vec::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw_line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (direction, rest) = if let Some(rest) = trimmed.strip_prefix('>') {
                (Direction::Out, rest)
            } else if let Some(rest) = trimmed.strip_prefix('<') {
                (Direction::In, rest)
            } else {
                return Err(DeviceError::ReplayParse {
                    line,
                    reason: "expected '>' or '<' direction marker".into(),
                });
            };
            entries.push((line, direction, from_hex(rest.trim(), line)?));
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> DeviceResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Render back to the text format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (_, direction, bytes) in &self.entries {
            let marker = match direction {
                Direction::Out => '>',
                Direction::In => '<',
            };
            let _ = writeln!(out, "{marker} {}", to_hex(bytes));
        }
        out
    }
}

/// Transport substitute fed by a recording.
pub struct ReplayTransport {
    outgoing: VecDeque<(usize, Vec<u8>)>,
    incoming: VecDeque<(usize, Vec<u8>)>,
}

impl ReplayTransport {
    pub fn new(log: ReplayLog) -> Self {
        let mut outgoing = VecDeque::new();
        let mut incoming = VecDeque::new();
        for (line, direction, bytes) in log.entries {
            match direction {
                Direction::Out => outgoing.push_back((line, bytes)),
                Direction::In => incoming.push_back((line, bytes)),
            }
        }
        Self { outgoing, incoming }
    }

    /// Whether every recorded packet has been consumed.
    pub fn exhausted(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }
}

impl Transport for ReplayTransport {
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()> {
        let (line, recorded) = self.outgoing.pop_front().ok_or(DeviceError::ReplayExhausted)?;
        if recorded != report {
            return Err(DeviceError::ReplayMismatch {
                line,
                wrote: to_hex(report),
                recorded: to_hex(&recorded),
            });
        }
        Ok(())
    }

    fn read_report(&mut self, _timeout: Duration) -> DeviceResult<Vec<u8>> {
        self.incoming
            .pop_front()
            .map(|(_, bytes)| bytes)
            .ok_or(DeviceError::ReplayExhausted)
    }
}
