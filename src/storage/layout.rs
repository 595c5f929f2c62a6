//! Persisted binary layout of the usage log.
//!
//! Everything is little-endian with explicit field order. Any change to the
//! layout must bump [`HEADER_VERSION`]; a page whose header carries another
//! version is treated as uninitialized.
//!
//! Page (1536 bytes = 512 program words of 3 bytes):
//! - Header: 45 bytes
//! - 71 record slots of 21 bytes each
//!
//! Header (45 bytes):
//! - version: 2 bytes (u16)
//! - switchon: 2 bytes (u16)
//! - poweron: 4 bytes (u32, minutes)
//! - studio: 2 bytes (u16, minutes)
//! - usb: 2 bytes (u16, minutes)
//! - reprogram: 2 bytes (u16)
//! - mode minutes: 16 bytes (8 × u16)
//! - poweroff: 2 bytes (u16, days)
//! - flags: 3 bytes (OR of everything retired into this lineage)
//! - padding: 10 bytes
//!
//! Record (21 bytes):
//! - flags: 3 bytes. The leading byte doubles as the commit byte: flag bit 0 is
//!   reserved clear, so a committed record never leaves it erased.
//! - poweron, studio, usb: 6 bytes (3 × u16)
//! - switchon, reprogram: 2 bytes
//! - mode minutes: 8 bytes
//! - poweroff: 1 byte
//! - reserved: 1 byte

use serde::{Deserialize, Serialize};

use crate::usage::{FLAG_BYTES, FeatureFlags, MODE_SLOTS, UsageAccumulator};

/// Bumped whenever the header or record layout changes
pub const HEADER_VERSION: u16 = 2;

/// Value of every byte after an erase
pub const ERASED: u8 = 0xFF;

/// Bytes programmed by one flash program operation (one 24-bit program word)
pub const WRITE_CHUNK: usize = 3;

pub const PAGE_SIZE: usize = 512 * WRITE_CHUNK;
pub const HEADER_SIZE: usize = 45;
pub const RECORD_SIZE: usize = 21;

/// Record slots per page
pub const RECORDS_PER_PAGE: usize = (PAGE_SIZE - HEADER_SIZE) / RECORD_SIZE;

/// Both pages together
pub const REGION_SIZE: usize = 2 * PAGE_SIZE;

const _: () = assert!(HEADER_SIZE % WRITE_CHUNK == 0);
const _: () = assert!(RECORD_SIZE % WRITE_CHUNK == 0);
const _: () = assert!(HEADER_SIZE + RECORDS_PER_PAGE * RECORD_SIZE <= PAGE_SIZE);

/// Running totals of every record retired into a page's lineage.
///
/// Written once per page generation (erase + program), never modified in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u16,
    pub switchon: u16,
    pub poweron_minutes: u32,
    pub studio_minutes: u16,
    pub usb_minutes: u16,
    pub reprogram: u16,
    pub mode_minutes: [u16; MODE_SLOTS],
    pub poweroff_days: u16,
    pub flags: FeatureFlags,
}

/// Immutable snapshot of one flushed epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Record {
    pub flags: FeatureFlags,
    pub poweron_minutes: u16,
    pub studio_minutes: u16,
    pub usb_minutes: u16,
    pub switchon: u8,
    pub reprogram: u8,
    pub mode_minutes: [u8; MODE_SLOTS],
    pub poweroff_days: u8,
}

impl Header {
    /// Fresh zero totals stamped with the current version
    pub const fn zeroed() -> Self {
        Self {
            version: HEADER_VERSION,
            switchon: 0,
            poweron_minutes: 0,
            studio_minutes: 0,
            usb_minutes: 0,
            reprogram: 0,
            mode_minutes: [0; MODE_SLOTS],
            poweroff_days: 0,
            flags: FeatureFlags::empty(),
        }
    }

    pub const fn is_current_version(&self) -> bool {
        self.version == HEADER_VERSION
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut offset = 0;

        let mut put = |field: &[u8]| {
            bytes[offset..offset + field.len()].copy_from_slice(field);
            offset += field.len();
        };

        put(&self.version.to_le_bytes());
        put(&self.switchon.to_le_bytes());
        put(&self.poweron_minutes.to_le_bytes());
        put(&self.studio_minutes.to_le_bytes());
        put(&self.usb_minutes.to_le_bytes());
        put(&self.reprogram.to_le_bytes());
        for minutes in self.mode_minutes {
            put(&minutes.to_le_bytes());
        }
        put(&self.poweroff_days.to_le_bytes());
        put(&self.flags.to_bytes());

        // Padding is already zero
        bytes
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let mut mode_minutes = [0u16; MODE_SLOTS];
        for (slot, minutes) in mode_minutes.iter_mut().enumerate() {
            *minutes = u16_at(14 + slot * 2);
        }

        let flags_at = 14 + MODE_SLOTS * 2 + 2;

        Self {
            version: u16_at(0),
            switchon: u16_at(2),
            poweron_minutes: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            studio_minutes: u16_at(8),
            usb_minutes: u16_at(10),
            reprogram: u16_at(12),
            mode_minutes,
            poweroff_days: u16_at(14 + MODE_SLOTS * 2),
            flags: FeatureFlags::from_bytes([
                bytes[flags_at],
                bytes[flags_at + 1],
                bytes[flags_at + 2],
            ]),
        }
    }
}

impl Record {
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];

        bytes[0..FLAG_BYTES].copy_from_slice(&self.flags.without_internal().to_bytes());
        bytes[3..5].copy_from_slice(&self.poweron_minutes.to_le_bytes());
        bytes[5..7].copy_from_slice(&self.studio_minutes.to_le_bytes());
        bytes[7..9].copy_from_slice(&self.usb_minutes.to_le_bytes());
        bytes[9] = self.switchon;
        bytes[10] = self.reprogram;
        bytes[11..11 + MODE_SLOTS].copy_from_slice(&self.mode_minutes);
        bytes[11 + MODE_SLOTS] = self.poweroff_days;

        bytes
    }

    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let mut mode_minutes = [0u8; MODE_SLOTS];
        mode_minutes.copy_from_slice(&bytes[11..11 + MODE_SLOTS]);

        Self {
            flags: FeatureFlags::from_bytes([bytes[0], bytes[1], bytes[2]]),
            poweron_minutes: u16_at(3),
            studio_minutes: u16_at(5),
            usb_minutes: u16_at(7),
            switchon: bytes[9],
            reprogram: bytes[10],
            mode_minutes,
            poweroff_days: bytes[11 + MODE_SLOTS],
        }
    }
}

impl From<&UsageAccumulator> for Record {
    fn from(acc: &UsageAccumulator) -> Self {
        Self {
            flags: acc.flags,
            poweron_minutes: acc.poweron_minutes,
            studio_minutes: acc.studio_minutes,
            usb_minutes: acc.usb_minutes,
            switchon: acc.switchon_count,
            reprogram: acc.reprogram_count,
            mode_minutes: acc.mode_minutes,
            poweroff_days: acc.poweroff_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{FeatureFlag, Mode};

    #[test]
    fn test_geometry() {
        assert_eq!(PAGE_SIZE, 1536);
        assert_eq!(RECORDS_PER_PAGE, 71);
        // Header + slots fill the page exactly
        assert_eq!(HEADER_SIZE + RECORDS_PER_PAGE * RECORD_SIZE, PAGE_SIZE);
    }

    #[test]
    fn test_header_serialization() {
        let mut header = Header::zeroed();
        header.switchon = 300;
        header.poweron_minutes = 0x0001_0203;
        header.mode_minutes[Mode::Line.slot()] = 1000;
        header.poweroff_days = 12;
        header.flags.insert(FeatureFlag::Brownout);

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..2], &HEADER_VERSION.to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x03, 0x02, 0x01, 0x00]);
        assert!(bytes[35..].iter().all(|&b| b == 0), "padding must be zero");

        assert_eq!(Header::from_bytes(&bytes), header);
    }

    #[test]
    fn test_erased_header_is_not_current() {
        let header = Header::from_bytes(&[ERASED; HEADER_SIZE]);
        assert!(!header.is_current_version());
    }

    #[test]
    fn test_record_serialization() {
        let mut acc = UsageAccumulator::zeroed();
        acc.poweron_minutes = 1441;
        acc.usb_minutes = 30;
        acc.switchon_count = 4;
        acc.mode_minutes[Mode::Follow.slot()] = 200;
        acc.mark_feature_used(FeatureFlag::LedRgb);

        let record = Record::from(&acc);
        let bytes = record.to_bytes();
        assert_eq!(&bytes[3..5], &1441u16.to_le_bytes());
        assert_eq!(bytes[RECORD_SIZE - 1], 0, "reserved byte");

        assert_eq!(Record::from_bytes(&bytes), record);
    }

    #[test]
    fn test_record_commit_byte_never_erased() {
        let record = Record {
            flags: FeatureFlags::from_bytes([ERASED; FLAG_BYTES]),
            ..Record::default()
        };
        assert_ne!(record.to_bytes()[0], ERASED);
    }
}
