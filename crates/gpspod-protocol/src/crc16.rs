//! CRC-16 as used by the device.
//!
//! The GPS Track Pod checksums both packets and message bodies with
//! CRC-16/IBM-3740: polynomial `0x1021`, initial value `0xFFFF`, no
//! reflection, no output xor. Verified bit-exact against recorded traffic.

use crc::{Crc, CRC_16_IBM_3740};

const CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Checksum `bytes` with the device's CRC-16 variant.
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC.checksum(bytes)
}
