//! Wireshark PDML import.
//!
//! Converts a PDML export of a USB capture into a [`ReplayLog`]: every
//! packet carrying `usb.capdata` becomes one log entry, with the direction
//! taken from the endpoint's direction bit. This is how vendor-software
//! captures are replayed against the command layer during protocol work.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::replay::from_hex;
use crate::{DeviceError, DeviceResult, Direction, ReplayLog};

#[derive(Default)]
struct PacketState {
    direction: Option<Direction>,
    capdata: Option<Vec<u8>>,
}

/// Parse PDML text into a replay log.
pub fn parse_pdml(text: &str) -> DeviceResult<ReplayLog> {
    let mut reader = Reader::from_str(text);
    let mut buf = Vec::new();
    let mut log = ReplayLog::default();
    let mut packet = PacketState::default();
    let mut index = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            DeviceError::ReplayParse {
                line: 0,
                reason: format!("PDML parse error: {e}"),
            }
        })?;
        match event {
            Event::Start(element) if element.name().as_ref() == b"packet" => {
                packet = PacketState::default();
            }
            Event::Start(element) | Event::Empty(element)
                if element.name().as_ref() == b"field" =>
            {
                let mut name = None;
                let mut value = None;
                let mut show = None;
                for attr in element.attributes() {
                    let attr = attr.map_err(|e| DeviceError::ReplayParse {
                        line: 0,
                        reason: format!("PDML attribute error: {e}"),
                    })?;
                    let text = attr
                        .unescape_value()
                        .map_err(|e| DeviceError::ReplayParse {
                            line: 0,
                            reason: format!("PDML attribute error: {e}"),
                        })?
                        .into_owned();
                    match attr.key.as_ref() {
                        b"name" => name = Some(text),
                        b"value" => value = Some(text),
                        b"show" => show = Some(text),
                        _ => {}
                    }
                }
                match name.as_deref() {
                    Some("usb.capdata") => {
                        if let Some(value) = value {
                            packet.capdata = Some(from_hex(&value, 0)?);
                        }
                    }
                    Some("usb.endpoint_address.direction")
                    | Some("usb.endpoint_number.direction") => {
                        packet.direction = match show.or(value).as_deref() {
                            Some("1") => Some(Direction::In),
                            Some("0") => Some(Direction::Out),
                            _ => packet.direction,
                        };
                    }
                    _ => {}
                }
            }
            Event::End(element) if element.name().as_ref() == b"packet" => {
                if let (Some(direction), Some(bytes)) =
                    (packet.direction, packet.capdata.take())
                {
                    index += 1;
                    log.entries.push((index, direction, bytes));
                }
                packet = PacketState::default();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(log)
}

/// Load a PDML file into a replay log.
pub fn load_pdml(path: &Path) -> DeviceResult<ReplayLog> {
    parse_pdml(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<pdml>
  <packet>
    <proto name="usb">
      <field name="usb.endpoint_address.direction" show="0" value="0"/>
    </proto>
    <field name="usb.capdata" value="5d000000020aff"/>
  </packet>
  <packet>
    <proto name="usb">
      <field name="usb.endpoint_address.direction" show="1" value="1"/>
    </proto>
    <field name="usb.capdata" value="5d0000000101"/>
  </packet>
  <packet>
    <proto name="usb">
      <field name="usb.endpoint_address.direction" show="1" value="1"/>
    </proto>
  </packet>
</pdml>
"#;

    #[test]
    fn packets_with_capdata_become_entries() {
        let log = parse_pdml(SAMPLE).expect("parse");
        assert_eq!(log.entries.len(), 2);
        assert_eq!(log.entries[0].1, Direction::Out);
        assert_eq!(log.entries[0].2[0], 0x5D);
        assert_eq!(log.entries[1].1, Direction::In);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(matches!(
            parse_pdml("<pdml><packet></pdml>"),
            Err(DeviceError::ReplayParse { .. })
        ));
    }
}
