//! Protocol development tools.

use std::path::Path;

use anyhow::Result;

use gpspod_device::{Direction, ReplayLog};
use gpspod_pmem::{block, decode_log_entries, LOG_BLOCK_OFFSET};
use gpspod_protocol::{decode_message, Packet};

use crate::source::{load_log, DataSource};
use crate::Cli;

/// Reassembles one direction of a captured stream, tolerating damage: a
/// packet that fails to decode drops the partial message instead of
/// aborting the view.
#[derive(Default)]
struct MessageFeed {
    body: Vec<u8>,
    active: bool,
}

impl MessageFeed {
    fn push(&mut self, bytes: &[u8]) -> Option<Result<(u16, Vec<u8>), String>> {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(error) => {
                self.active = false;
                self.body.clear();
                return Some(Err(format!("damaged packet: {error}")));
            }
        };
        if packet.index == 0 {
            self.body.clear();
            self.active = true;
        }
        if !self.active {
            return Some(Err("packet without a message start".into()));
        }
        self.body.extend_from_slice(&packet.payload);
        if packet.index != packet.last {
            return None;
        }
        self.active = false;
        let message = std::mem::take(&mut self.body);
        match decode_message(&message) {
            Ok((code, body)) => Some(Ok((code, body.to_vec()))),
            Err(error) => Some(Err(format!("damaged message: {error}"))),
        }
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    const LIMIT: usize = 24;
    let shown: Vec<String> = bytes.iter().take(LIMIT).map(|b| format!("{b:02X}")).collect();
    let suffix = if bytes.len() > LIMIT { " …" } else { "" };
    format!("{}{suffix}", shown.join(" "))
}

pub fn view(file: &Path) -> Result<()> {
    let log: ReplayLog = load_log(file)?;
    let mut outgoing = MessageFeed::default();
    let mut incoming = MessageFeed::default();

    for (line, direction, bytes) in &log.entries {
        let (feed, marker) = match direction {
            Direction::Out => (&mut outgoing, '>'),
            Direction::In => (&mut incoming, '<'),
        };
        match feed.push(bytes) {
            Some(Ok((code, body))) => println!(
                "#{line: >5} {marker} cmd {code:#06x} len {: >4}  {}",
                body.len(),
                hex_preview(&body)
            ),
            Some(Err(reason)) => println!("#{line: >5} {marker} {reason}"),
            None => {}
        }
    }
    Ok(())
}

pub fn internallog(cli: &Cli) -> Result<()> {
    let mut source = DataSource::open(cli)?;
    let stream = block::read_chain(&mut source, LOG_BLOCK_OFFSET)?;
    let (entries, warnings) = decode_log_entries(&stream);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}
