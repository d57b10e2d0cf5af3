//! Property-based tests for the packet codec and message framing.

use gpspod_protocol::{
    crc16, decode_message, encode_message, packetize, Packet, PacketAssembler, PACKET_LEN,
};
use proptest::prelude::*;

/// Encode a message, push it through packetize/assemble, decode it back.
fn roundtrip(seq: u8, command: u16, payload: &[u8]) -> (u16, Vec<u8>) {
    let message = encode_message(command, payload);
    let packets = packetize(seq, &message, PACKET_LEN).expect("packetize");
    let mut assembler = PacketAssembler::new(seq);
    let mut assembled = None;
    for raw in &packets {
        assert!(assembled.is_none(), "message completed before last packet");
        assembled = assembler
            .push(Packet::decode(raw).expect("packet decode"))
            .expect("assembler push");
    }
    let assembled = assembled.expect("message incomplete after last packet");
    let (code, body) = decode_message(&assembled).expect("message decode");
    (code, body.to_vec())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    /// decode(encode(c, p)) == (c, p) for arbitrary payloads and codes.
    #[test]
    fn prop_codec_roundtrip(seq: u8, command: u16, payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (code, body) = roundtrip(seq, command, &payload);
        prop_assert_eq!(code, command);
        prop_assert_eq!(body, payload);
    }

    /// Every emitted packet carries a valid trailing CRC over the bytes
    /// before it.
    #[test]
    fn prop_packet_crc_verifies(seq: u8, payload in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let message = encode_message(0x0007, &payload);
        for raw in packetize(seq, &message, PACKET_LEN).expect("packetize") {
            let len = raw[4] as usize;
            let end = 5 + len;
            let stored = u16::from_le_bytes([raw[end], raw[end + 1]]);
            prop_assert_eq!(crc16::checksum(&raw[..end]), stored);
        }
    }

    /// Flipping any payload byte of any packet must fail the packet CRC.
    #[test]
    fn prop_corruption_detected(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        victim_byte in any::<usize>(),
    ) {
        let message = encode_message(0x0007, &payload);
        let mut packets = packetize(0, &message, PACKET_LEN).expect("packetize");
        let victim = victim_byte % packets.len();
        let len = packets[victim][4] as usize;
        prop_assume!(len > 0);
        let flip = 5 + victim_byte % len;
        packets[victim][flip] ^= 0x01;
        prop_assert!(Packet::decode(&packets[victim]).is_err());
    }

    /// Packet count matches the payload size and the 57-byte capacity.
    #[test]
    fn prop_packet_count(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let message = encode_message(0x0000, &payload);
        let packets = packetize(0, &message, PACKET_LEN).expect("packetize");
        prop_assert_eq!(packets.len(), message.len().div_ceil(57).max(1));
    }
}

#[test]
fn large_message_roundtrip() {
    // 64 KiB payload, the largest transfer the command layer will request.
    let payload: Vec<u8> = (0..0x10000u32).map(|v| (v * 31 % 251) as u8).collect();
    let (code, body) = roundtrip(0xFE, 0x0007, &payload);
    assert_eq!(code, 0x0007);
    assert_eq!(body, payload);
}
