//! Typed command bodies.
//!
//! Each command is a pure function over the codec: the session encodes a
//! request body, sends it with [`crate::encode_message`], and parses the
//! reply body with one of the types here. Encoders for reply bodies exist
//! too; the replay tooling and the test suites use them to reconstruct
//! device traffic.

use crate::{ProtocolError, ProtocolResult};

/// Command codes as observed on the wire. Replies echo the request code.
pub mod codes {
    /// Model, serial and version strings.
    pub const DEVICE_INFO: u16 = 0x0000;
    /// Battery charge and status.
    pub const DEVICE_STATUS: u16 = 0x0603;
    /// Read the opaque settings blob.
    pub const READ_SETTINGS: u16 = 0x000B;
    /// Write a byte range within the settings blob.
    pub const WRITE_SETTING: u16 = 0x010B;
    /// Timed read of the data region.
    pub const READ_MEMORY: u16 = 0x0007;
    /// Paginated directory enumeration.
    pub const LIST_FILES: u16 = 0x060B;
    /// Set the device wall clock.
    pub const SET_TIME: u16 = 0x0003;
}

/// Size of the opaque settings blob returned by ReadSettings.
pub const SETTINGS_SIZE: usize = 0x800;

fn take<'a>(body: &'a [u8], at: usize, len: usize, what: &'static str) -> ProtocolResult<&'a [u8]> {
    body.get(at..at + len).ok_or(ProtocolError::BodyLength {
        what,
        expected: at + len,
        actual: body.len(),
    })
}

fn trimmed_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn version_string(v: &[u8; 4]) -> String {
    format!("{}.{}.{}.{}", v[0], v[1], v[2], v[3])
}

/// Reply to [`codes::DEVICE_INFO`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    pub fw_version: [u8; 4],
    pub hw_version: [u8; 4],
    pub bsl_version: [u8; 4],
}

impl DeviceInfo {
    pub const BODY_LEN: usize = 16 + 16 + 4 + 4 + 4;

    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        if body.len() != Self::BODY_LEN {
            return Err(ProtocolError::BodyLength {
                what: "device info",
                expected: Self::BODY_LEN,
                actual: body.len(),
            });
        }
        let mut fw = [0u8; 4];
        let mut hw = [0u8; 4];
        let mut bsl = [0u8; 4];
        fw.copy_from_slice(&body[32..36]);
        hw.copy_from_slice(&body[36..40]);
        bsl.copy_from_slice(&body[40..44]);
        Ok(Self {
            model: trimmed_ascii(&body[0..16]),
            serial: trimmed_ascii(&body[16..32]),
            fw_version: fw,
            hw_version: hw,
            bsl_version: bsl,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = vec![0u8; Self::BODY_LEN];
        let model = self.model.as_bytes();
        let serial = self.serial.as_bytes();
        body[..model.len().min(16)].copy_from_slice(&model[..model.len().min(16)]);
        body[16..16 + serial.len().min(16)].copy_from_slice(&serial[..serial.len().min(16)]);
        body[32..36].copy_from_slice(&self.fw_version);
        body[36..40].copy_from_slice(&self.hw_version);
        body[40..44].copy_from_slice(&self.bsl_version);
        body
    }

    pub fn fw(&self) -> String {
        version_string(&self.fw_version)
    }

    pub fn hw(&self) -> String {
        version_string(&self.hw_version)
    }

    pub fn bsl(&self) -> String {
        version_string(&self.bsl_version)
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Model: {}, Serial: {}, fw: {} hw: {} bsl: {}",
            self.model,
            self.serial,
            self.fw(),
            self.hw(),
            self.bsl()
        )
    }
}

/// Reply to [`codes::DEVICE_STATUS`]: a status byte and the battery charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub charge: u8,
}

impl DeviceStatus {
    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let bytes = take(body, 0, 2, "device status")?;
        if bytes[0] != 0 {
            return Err(ProtocolError::DeviceStatus(bytes[0]));
        }
        Ok(Self { charge: bytes[1] })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![0, self.charge]
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Charge: {}%", self.charge)
    }
}

/// Parse a reply whose body is a status byte followed by the settings blob.
pub fn parse_settings_reply(body: &[u8]) -> ProtocolResult<Vec<u8>> {
    let status = take(body, 0, 1, "settings")?[0];
    if status != 0 {
        return Err(ProtocolError::DeviceStatus(status));
    }
    let blob = take(body, 1, SETTINGS_SIZE, "settings")?;
    Ok(blob.to_vec())
}

/// Parse a bare acknowledgement body: one status byte.
pub fn parse_ack(body: &[u8], what: &'static str) -> ProtocolResult<()> {
    let bytes = take(body, 0, 1, what)?;
    if bytes[0] != 0 {
        return Err(ProtocolError::DeviceStatus(bytes[0]));
    }
    Ok(())
}

/// Request body for [`codes::WRITE_SETTING`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSettingRequest {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

impl WriteSettingRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + self.bytes.len());
        body.extend_from_slice(&self.offset.to_le_bytes());
        body.extend_from_slice(&(self.bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.bytes);
        body
    }

    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let head = take(body, 0, 8, "write setting")?;
        let offset = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let length = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
        let bytes = take(body, 8, length, "write setting")?;
        Ok(Self {
            offset,
            bytes: bytes.to_vec(),
        })
    }
}

/// Request body for [`codes::READ_MEMORY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMemoryRequest {
    pub offset: u32,
    pub length: u32,
}

impl ReadMemoryRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&self.offset.to_le_bytes());
        body.extend_from_slice(&self.length.to_le_bytes());
        body
    }

    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let bytes = take(body, 0, 8, "read memory request")?;
        Ok(Self {
            offset: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Reply body for [`codes::READ_MEMORY`]: the echoed position plus data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryChunk {
    pub offset: u32,
    pub data: Vec<u8>,
}

impl MemoryChunk {
    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let head = take(body, 0, 8, "memory chunk")?;
        let offset = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
        let length = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
        let data = take(body, 8, length, "memory chunk")?;
        Ok(Self {
            offset,
            data: data.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8 + self.data.len());
        body.extend_from_slice(&self.offset.to_le_bytes());
        body.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        body.extend_from_slice(&self.data);
        body
    }
}

/// One page of a [`codes::LIST_FILES`] reply. An empty page ends the
/// enumeration and resets the device-side cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
}

const DIR_ENTRY_LEN: usize = 12 + 4;

/// Parse a directory page: status, count, then `count` fixed-size entries.
pub fn parse_dir_page(body: &[u8]) -> ProtocolResult<Vec<DirEntry>> {
    let head = take(body, 0, 2, "directory page")?;
    if head[0] != 0 {
        return Err(ProtocolError::DeviceStatus(head[0]));
    }
    let count = head[1] as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let raw = take(body, 2 + i * DIR_ENTRY_LEN, DIR_ENTRY_LEN, "directory page")?;
        entries.push(DirEntry {
            name: trimmed_ascii(&raw[0..12]),
            size: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
        });
    }
    Ok(entries)
}

/// Serialise a directory page (replay fixtures).
pub fn encode_dir_page(entries: &[DirEntry]) -> Vec<u8> {
    let mut body = vec![0u8, entries.len() as u8];
    for entry in entries {
        let mut raw = [0u8; DIR_ENTRY_LEN];
        let name = entry.name.as_bytes();
        raw[..name.len().min(12)].copy_from_slice(&name[..name.len().min(12)]);
        raw[12..16].copy_from_slice(&entry.size.to_le_bytes());
        body.extend_from_slice(&raw);
    }
    body
}

/// Request body for [`codes::SET_TIME`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub ms: u16,
}

impl TimeOfDay {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&self.year.to_le_bytes());
        body.push(self.month);
        body.push(self.day);
        body.push(self.hour);
        body.push(self.minute);
        body.extend_from_slice(&self.ms.to_le_bytes());
        body
    }

    pub fn parse(body: &[u8]) -> ProtocolResult<Self> {
        let bytes = take(body, 0, 8, "time of day")?;
        Ok(Self {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            ms: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}
