//! The command layer: strict request/reply pairing over a transport.

use std::time::Duration;

use tracing::{debug, warn};

use gpspod_protocol::commands::{
    self, codes, DeviceInfo, DeviceStatus, DirEntry, MemoryChunk, ReadMemoryRequest, TimeOfDay,
    WriteSettingRequest,
};
use gpspod_protocol::{
    decode_reply, encode_message, packetize, Packet, PacketAssembler, ProtocolError,
};

use crate::{DeviceError, DeviceResult, Transport};

/// Retry attempts per command for transient failures.
const MAX_RETRIES: u32 = 3;
/// Base backoff between attempts; quadruples each retry (10/40/160 ms).
const RETRY_BASE: Duration = Duration::from_millis(10);

/// Host pacing knobs.
///
/// These exist solely to accommodate host USB stacks that corrupt
/// subsequent transfers without breathing room after large reads.
#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    /// Timeout per transport read.
    pub read_timeout: Duration,
    /// Reply size in bytes above which to pause; `None` disables pacing.
    pub sleep_minsize: Option<usize>,
    /// Pause length after a large reply.
    pub sleep_duration: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(1000),
            sleep_minsize: None,
            sleep_duration: Duration::from_millis(100),
        }
    }
}

/// One session against the device.
///
/// Owns the transport and the per-session sequence counter. Commands run
/// strictly one at a time; a sequence mismatch poisons the session and
/// every later command fails with [`DeviceError::Desync`] until the device
/// is reopened.
pub struct Session<T: Transport> {
    transport: T,
    seq: u8,
    pacing: PacingConfig,
    desynced: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_pacing(transport, PacingConfig::default())
    }

    pub fn with_pacing(transport: T, pacing: PacingConfig) -> Self {
        Self {
            transport,
            seq: 0,
            pacing,
            desynced: false,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session, returning the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Issue one command and return the reply body.
    ///
    /// Transient failures (packet corruption, timeouts) retry the whole
    /// command with fresh sequence numbers and exponential backoff. A
    /// sequence mismatch never retries.
    pub fn command(&mut self, code: u16, body: &[u8]) -> DeviceResult<Vec<u8>> {
        if self.desynced {
            return Err(DeviceError::Desync);
        }
        let mut attempt = 0;
        loop {
            let seq = self.seq;
            self.seq = self.seq.wrapping_add(1);
            match self.exchange(seq, code, body) {
                Ok(reply) => {
                    if let Some(minsize) = self.pacing.sleep_minsize {
                        if reply.len() > minsize {
                            std::thread::sleep(self.pacing.sleep_duration);
                        }
                    }
                    return Ok(reply);
                }
                Err(DeviceError::Protocol(ProtocolError::SequenceMismatch {
                    expected,
                    actual,
                })) => {
                    warn!(expected, actual, "sequence mismatch, poisoning session");
                    self.desynced = true;
                    return Err(DeviceError::Desync);
                }
                Err(error) if error.is_transient() && attempt < MAX_RETRIES => {
                    let backoff = RETRY_BASE * 4u32.pow(attempt);
                    warn!(%error, attempt, ?backoff, "transient command failure, retrying");
                    attempt += 1;
                    self.drain();
                    std::thread::sleep(backoff);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn exchange(&mut self, seq: u8, code: u16, body: &[u8]) -> DeviceResult<Vec<u8>> {
        let message = encode_message(code, body);
        let packets = packetize(seq, &message, self.transport.packet_len())
            .map_err(DeviceError::Protocol)?;
        debug!(
            code = format_args!("{code:#06x}"),
            seq,
            packets = packets.len(),
            body = body.len(),
            "command"
        );
        for raw in &packets {
            self.transport.write_report(raw)?;
        }

        let mut assembler = PacketAssembler::new(seq);
        loop {
            let raw = self.transport.read_report(self.pacing.read_timeout)?;
            let packet = Packet::decode(&raw).map_err(DeviceError::Protocol)?;
            if let Some(reply) = assembler.push(packet).map_err(DeviceError::Protocol)? {
                let reply_body = decode_reply(&reply, code).map_err(DeviceError::Protocol)?;
                return Ok(reply_body.to_vec());
            }
        }
    }

    /// Discard any reply packets still in flight from an aborted exchange.
    fn drain(&mut self) {
        while self.transport.read_report(Duration::from_millis(50)).is_ok() {}
    }

    // --- Typed commands ---------------------------------------------------

    pub fn device_info(&mut self) -> DeviceResult<DeviceInfo> {
        let body = self.command(codes::DEVICE_INFO, &[])?;
        Ok(DeviceInfo::parse(&body)?)
    }

    pub fn device_status(&mut self) -> DeviceResult<DeviceStatus> {
        let body = self.command(codes::DEVICE_STATUS, &[])?;
        Ok(DeviceStatus::parse(&body)?)
    }

    /// The 2 KiB opaque settings blob.
    pub fn read_settings(&mut self) -> DeviceResult<Vec<u8>> {
        let body = self.command(codes::READ_SETTINGS, &[])?;
        Ok(commands::parse_settings_reply(&body)?)
    }

    /// Write a byte range within the settings blob. Not idempotent as a
    /// setting, but repeating an identical write is safe.
    pub fn write_setting(&mut self, offset: u32, bytes: &[u8]) -> DeviceResult<()> {
        let request = WriteSettingRequest {
            offset,
            bytes: bytes.to_vec(),
        };
        let body = self.command(codes::WRITE_SETTING, &request.encode())?;
        Ok(commands::parse_ack(&body, "write setting")?)
    }

    /// Timed read of `length` bytes at `offset` in the data region.
    pub fn read_memory(&mut self, offset: u32, length: u32) -> DeviceResult<Vec<u8>> {
        let request = ReadMemoryRequest { offset, length };
        let body = self.command(codes::READ_MEMORY, &request.encode())?;
        let chunk = MemoryChunk::parse(&body)?;
        if chunk.offset != offset {
            return Err(DeviceError::MisplacedChunk {
                offset,
                actual: chunk.offset,
            });
        }
        Ok(chunk.data)
    }

    /// Enumerate the device directory. The device serves pages against an
    /// internal cursor; an empty page ends the listing.
    pub fn list_files(&mut self) -> DeviceResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        // Bounded: the FAT root directory cannot hold more entries.
        for _ in 0..512 {
            let body = self.command(codes::LIST_FILES, &[])?;
            let page = commands::parse_dir_page(&body)?;
            if page.is_empty() {
                return Ok(entries);
            }
            entries.extend(page);
        }
        Ok(entries)
    }

    pub fn set_time(&mut self, time: TimeOfDay) -> DeviceResult<()> {
        let body = self.command(codes::SET_TIME, &time.encode())?;
        Ok(commands::parse_ack(&body, "set time")?)
    }
}
