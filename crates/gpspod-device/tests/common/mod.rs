//! A scripted device double for session and memory-view tests.
//!
//! Speaks the real wire protocol: assembles request packets, serves typed
//! replies from a backing region image, and can inject the fault modes the
//! retry logic has to survive.

// Each test binary uses its own subset of the double.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use gpspod_device::{DeviceError, DeviceResult, Transport};
use gpspod_protocol::commands::{
    self, codes, DeviceInfo, DirEntry, MemoryChunk, ReadMemoryRequest, WriteSettingRequest,
};
use gpspod_protocol::{
    decode_message, encode_message, packetize, Packet, PacketAssembler, PACKET_LEN,
};

pub fn stock_info() -> DeviceInfo {
    DeviceInfo {
        model: "GpsPod".into(),
        serial: "8761994617001000".into(),
        fw_version: [1, 6, 39, 0],
        hw_version: [66, 2, 0, 0],
        bsl_version: [1, 4, 3, 0],
    }
}

pub struct FakeDevice {
    pub image: Vec<u8>,
    pub info: DeviceInfo,
    pub charge: u8,
    pub settings: Vec<u8>,
    pub files: Vec<DirEntry>,
    file_cursor: usize,
    /// Corrupt the CRC of the first packet of the next reply.
    pub corrupt_next_reply: bool,
    /// Answer the next request with a bogus sequence number.
    pub wrong_seq_next_reply: bool,
    pub read_memory_commands: usize,
    assembler: Option<PacketAssembler>,
    seq: u8,
    pending: VecDeque<Vec<u8>>,
}

impl FakeDevice {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            info: stock_info(),
            charge: 93,
            settings: vec![0u8; commands::SETTINGS_SIZE],
            files: vec![
                DirEntry {
                    name: "BBPMEM.DAT".into(),
                    size: 3_750_000,
                },
                DirEntry {
                    name: "SGEE.DAT".into(),
                    size: 36_212,
                },
            ],
            file_cursor: 0,
            corrupt_next_reply: false,
            wrong_seq_next_reply: false,
            read_memory_commands: 0,
            assembler: None,
            seq: 0,
            pending: VecDeque::new(),
        }
    }

    fn handle_message(&mut self, seq: u8, message: &[u8]) {
        let (code, body) = decode_message(message).expect("well-formed request");
        let reply_body = match code {
            codes::DEVICE_INFO => self.info.encode(),
            codes::DEVICE_STATUS => vec![0, self.charge],
            codes::READ_SETTINGS => {
                let mut out = vec![0u8];
                out.extend_from_slice(&self.settings);
                out
            }
            codes::WRITE_SETTING => {
                let request = WriteSettingRequest::parse(body).expect("write body");
                let at = request.offset as usize;
                self.settings[at..at + request.bytes.len()].copy_from_slice(&request.bytes);
                // Settings live at 0x2000 inside the region image too.
                let region_at = 0x2000 + at;
                self.image[region_at..region_at + request.bytes.len()]
                    .copy_from_slice(&request.bytes);
                vec![0]
            }
            codes::READ_MEMORY => {
                self.read_memory_commands += 1;
                let request = ReadMemoryRequest::parse(body).expect("read body");
                let start = request.offset as usize;
                let end = start + request.length as usize;
                MemoryChunk {
                    offset: request.offset,
                    data: self.image[start..end].to_vec(),
                }
                .encode()
            }
            codes::LIST_FILES => {
                const PAGE: usize = 1;
                let page: Vec<DirEntry> = self
                    .files
                    .iter()
                    .skip(self.file_cursor)
                    .take(PAGE)
                    .cloned()
                    .collect();
                if page.is_empty() {
                    self.file_cursor = 0;
                } else {
                    self.file_cursor += page.len();
                }
                commands::encode_dir_page(&page)
            }
            codes::SET_TIME => vec![0],
            other => panic!("unscripted command {other:#06x}"),
        };

        let reply_seq = if self.wrong_seq_next_reply {
            self.wrong_seq_next_reply = false;
            seq.wrapping_add(0x55)
        } else {
            seq
        };
        let message = encode_message(code, &reply_body);
        let mut packets = packetize(reply_seq, &message, PACKET_LEN).expect("reply packets");
        if self.corrupt_next_reply {
            self.corrupt_next_reply = false;
            if let Some(first) = packets.first_mut() {
                first[6] ^= 0xFF;
            }
        }
        self.pending.extend(packets);
    }
}

impl Transport for FakeDevice {
    fn write_report(&mut self, report: &[u8]) -> DeviceResult<()> {
        let packet = Packet::decode(report).expect("well-formed request packet");
        if packet.index == 0 {
            self.assembler = Some(PacketAssembler::new(packet.seq));
            self.seq = packet.seq;
        }
        let assembler = self.assembler.as_mut().expect("request in progress");
        if let Some(message) = assembler.push(packet).expect("request assembly") {
            self.assembler = None;
            let seq = self.seq;
            self.handle_message(seq, &message);
        }
        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> DeviceResult<Vec<u8>> {
        self.pending
            .pop_front()
            .ok_or(DeviceError::Timeout(timeout.as_millis() as u64))
    }
}
