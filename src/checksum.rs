//! CRC primitive used to seal the retained accumulator image.
//!
//! CRC-16/XMODEM: polynomial 0x1021, initial value 0, no reflection.

use crc::{CRC_16_XMODEM, Crc};

const CRC_ALG: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the 16-bit CRC over `bytes`.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC_ALG.checksum(bytes)
}
