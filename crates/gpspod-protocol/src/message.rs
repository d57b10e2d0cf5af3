//! Message framing on top of the packet layer.

use crate::crc16;
use crate::{ProtocolError, ProtocolResult};

/// Header (command + length) plus trailing CRC.
pub const MESSAGE_OVERHEAD: usize = 2 + 4 + 2;

/// Serialise a command message: `command || length || body || crc16(body)`.
pub fn encode_message(command: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MESSAGE_OVERHEAD + body.len());
    out.extend_from_slice(&command.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&crc16::checksum(body).to_le_bytes());
    out
}

/// Parse a message, returning the command code and body.
pub fn decode_message(bytes: &[u8]) -> ProtocolResult<(u16, &[u8])> {
    if bytes.len() < MESSAGE_OVERHEAD {
        return Err(ProtocolError::MessageTruncated {
            declared: 0,
            actual: bytes.len(),
        });
    }
    let command = u16::from_le_bytes([bytes[0], bytes[1]]);
    let declared = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;
    if bytes.len() < MESSAGE_OVERHEAD + declared {
        return Err(ProtocolError::MessageTruncated {
            declared,
            actual: bytes.len().saturating_sub(MESSAGE_OVERHEAD),
        });
    }
    let body = &bytes[6..6 + declared];
    let stored = u16::from_le_bytes([bytes[6 + declared], bytes[6 + declared + 1]]);
    let computed = crc16::checksum(body);
    if stored != computed {
        return Err(ProtocolError::MessageCrc { computed, stored });
    }
    Ok((command, body))
}

/// Parse a reply message and check that it echoes `expected` command code.
pub fn decode_reply(bytes: &[u8], expected: u16) -> ProtocolResult<&[u8]> {
    let (command, body) = decode_message(bytes)?;
    if command != expected {
        return Err(ProtocolError::UnexpectedReply {
            expected,
            actual: command,
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::codes;

    #[test]
    fn roundtrip() {
        let body = b"hello device";
        let wire = encode_message(codes::READ_MEMORY, body);
        let (command, decoded) = decode_message(&wire).expect("decode");
        assert_eq!(command, codes::READ_MEMORY);
        assert_eq!(decoded, body);
    }

    #[test]
    fn empty_body_is_valid() {
        let wire = encode_message(codes::DEVICE_INFO, &[]);
        assert_eq!(wire.len(), MESSAGE_OVERHEAD);
        let (command, body) = decode_message(&wire).expect("decode");
        assert_eq!(command, codes::DEVICE_INFO);
        assert!(body.is_empty());
    }

    #[test]
    fn body_corruption_is_detected() {
        let mut wire = encode_message(codes::READ_MEMORY, &[1, 2, 3, 4]);
        wire[7] ^= 0x40;
        assert!(matches!(
            decode_message(&wire),
            Err(ProtocolError::MessageCrc { .. })
        ));
    }

    #[test]
    fn reply_code_mismatch() {
        let wire = encode_message(codes::DEVICE_STATUS, &[0, 93]);
        let err = decode_reply(&wire, codes::DEVICE_INFO).expect_err("mismatch");
        assert!(matches!(err, ProtocolError::UnexpectedReply { .. }));
    }
}
