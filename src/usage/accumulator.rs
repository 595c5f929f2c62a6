//! Running counters for the current, not-yet-flushed epoch.
//!
//! Binary image (little-endian, 22 bytes):
//! - poweron_minutes: 2 bytes (u16)
//! - studio_minutes: 2 bytes (u16)
//! - usb_minutes: 2 bytes (u16)
//! - switchon_count: 1 byte
//! - reprogram_count: 1 byte
//! - mode_minutes: 8 bytes (one per histogram slot)
//! - poweroff_days: 1 byte
//! - flags: 3 bytes
//! - crc: 2 bytes (CRC-16 over the 20 preceding bytes)

use super::{FLAG_BYTES, FeatureFlag, FeatureFlags, MODE_SLOTS, Mode, PowerState};
use crate::checksum::crc16;

/// Number of image bytes covered by the CRC
pub const SEALED_LEN: usize = 6 + 2 + MODE_SLOTS + 1 + FLAG_BYTES;

/// Full image length including the stored CRC
pub const IMAGE_LEN: usize = SEALED_LEN + 2;

/// RAM-resident usage counters.
///
/// The minute counters saturate at `u16::MAX` (~45 days), far beyond the one-day
/// flush period. The 8-bit counters saturate at 255 and read as "at least N".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageAccumulator {
    pub poweron_minutes: u16,
    /// Minutes on external power with the host channel open
    pub studio_minutes: u16,
    /// Minutes on external power without the host channel
    pub usb_minutes: u16,
    pub switchon_count: u8,
    pub reprogram_count: u8,
    /// Minutes per behaviour mode, last slot for "no mode"
    pub mode_minutes: [u8; MODE_SLOTS],
    pub poweroff_days: u8,
    pub flags: FeatureFlags,
    crc: u16,
}

impl UsageAccumulator {
    /// All counters zero. The CRC of an all-zero image is zero, so this also validates.
    pub const fn zeroed() -> Self {
        Self {
            poweron_minutes: 0,
            studio_minutes: 0,
            usb_minutes: 0,
            switchon_count: 0,
            reprogram_count: 0,
            mode_minutes: [0; MODE_SLOTS],
            poweroff_days: 0,
            flags: FeatureFlags::empty(),
            crc: 0,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::zeroed();
    }

    /// Record that a feature was used. There is no way to clear a flag.
    pub fn mark_feature_used(&mut self, flag: FeatureFlag) {
        self.flags.insert(flag);
    }

    pub fn mark_features_used(&mut self, flags: FeatureFlags) {
        self.flags = self.flags.union(flags);
    }

    /// Account one power-on minute.
    pub fn tick_poweron(&mut self, mode: Option<Mode>, power: PowerState) {
        self.poweron_minutes = self.poweron_minutes.saturating_add(1);

        let slot = &mut self.mode_minutes[Mode::slot_of(mode)];
        *slot = slot.saturating_add(1);

        if power.external_power {
            if power.channel_open {
                self.studio_minutes = self.studio_minutes.saturating_add(1);
            } else {
                self.usb_minutes = self.usb_minutes.saturating_add(1);
            }
        }
    }

    /// Account one full day spent powered off
    pub fn add_poweroff_day(&mut self) {
        self.poweroff_days = self.poweroff_days.saturating_add(1);
    }

    pub fn note_switch_on(&mut self) {
        self.switchon_count = self.switchon_count.saturating_add(1);
    }

    pub fn note_reprogram(&mut self) {
        self.reprogram_count = self.reprogram_count.saturating_add(1);
    }

    pub const fn stored_crc(&self) -> u16 {
        self.crc
    }

    fn compute_crc(&self) -> u16 {
        let image = self.to_bytes();
        crc16(&image[..SEALED_LEN])
    }

    /// Check the stored CRC against the current field values.
    ///
    /// A mismatch means the memory did not survive the reset intact and the
    /// caller must zero the accumulator.
    pub fn validate(&self) -> bool {
        self.compute_crc() == self.crc
    }

    /// Recompute and store the CRC. Must run right before any controlled reset.
    pub fn seal(&mut self) {
        self.crc = self.compute_crc();
    }

    /// Serialize to the retained image layout.
    pub fn to_bytes(&self) -> [u8; IMAGE_LEN] {
        let mut bytes = [0u8; IMAGE_LEN];
        let mut offset = 0;

        for value in [self.poweron_minutes, self.studio_minutes, self.usb_minutes] {
            bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            offset += 2;
        }

        bytes[offset] = self.switchon_count;
        bytes[offset + 1] = self.reprogram_count;
        offset += 2;

        bytes[offset..offset + MODE_SLOTS].copy_from_slice(&self.mode_minutes);
        offset += MODE_SLOTS;

        bytes[offset] = self.poweroff_days;
        offset += 1;

        bytes[offset..offset + FLAG_BYTES].copy_from_slice(&self.flags.to_bytes());
        offset += FLAG_BYTES;

        bytes[offset..offset + 2].copy_from_slice(&self.crc.to_le_bytes());

        bytes
    }

    /// Deserialize from the retained image layout. No validation is done here.
    pub fn from_bytes(bytes: &[u8; IMAGE_LEN]) -> Self {
        let u16_at = |offset: usize| u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        let mut mode_minutes = [0u8; MODE_SLOTS];
        mode_minutes.copy_from_slice(&bytes[8..8 + MODE_SLOTS]);

        let flags_at = 8 + MODE_SLOTS + 1;
        let mut flags = [0u8; FLAG_BYTES];
        flags.copy_from_slice(&bytes[flags_at..flags_at + FLAG_BYTES]);

        Self {
            poweron_minutes: u16_at(0),
            studio_minutes: u16_at(2),
            usb_minutes: u16_at(4),
            switchon_count: bytes[6],
            reprogram_count: bytes[7],
            mode_minutes,
            poweroff_days: bytes[8 + MODE_SLOTS],
            flags: FeatureFlags::from_bytes(flags),
            crc: u16_at(SEALED_LEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UNKNOWN_MODE_SLOT;

    const BATTERY: PowerState = PowerState {
        external_power: false,
        channel_open: false,
    };

    #[test]
    fn test_image_len() {
        assert_eq!(SEALED_LEN, 20);
        assert_eq!(IMAGE_LEN, 22);
    }

    #[test]
    fn test_poweron_ticks_count_exactly() {
        let mut acc = UsageAccumulator::zeroed();
        for _ in 0..1000 {
            acc.tick_poweron(Some(Mode::Line), BATTERY);
        }
        assert_eq!(acc.poweron_minutes, 1000);
        assert_eq!(acc.studio_minutes, 0);
        assert_eq!(acc.usb_minutes, 0);
    }

    #[test]
    fn test_mode_buckets_saturate() {
        let mut acc = UsageAccumulator::zeroed();
        for _ in 0..600 {
            acc.tick_poweron(None, BATTERY);
        }
        assert_eq!(acc.mode_minutes[UNKNOWN_MODE_SLOT], u8::MAX);
        assert_eq!(acc.poweron_minutes, 600);
    }

    #[test]
    fn test_poweron_minutes_saturate() {
        let mut acc = UsageAccumulator::zeroed();
        acc.poweron_minutes = u16::MAX - 1;
        acc.tick_poweron(Some(Mode::Menu), BATTERY);
        acc.tick_poweron(Some(Mode::Menu), BATTERY);
        assert_eq!(acc.poweron_minutes, u16::MAX);
    }

    #[test]
    fn test_power_source_attribution() {
        let mut acc = UsageAccumulator::zeroed();
        let studio = PowerState {
            external_power: true,
            channel_open: true,
        };
        let usb = PowerState {
            external_power: true,
            channel_open: false,
        };
        // Channel without external power is ignored
        let channel_only = PowerState {
            external_power: false,
            channel_open: true,
        };

        acc.tick_poweron(Some(Mode::Menu), studio);
        acc.tick_poweron(Some(Mode::Menu), studio);
        acc.tick_poweron(Some(Mode::Menu), usb);
        acc.tick_poweron(Some(Mode::Menu), channel_only);

        assert_eq!(acc.poweron_minutes, 4);
        assert_eq!(acc.studio_minutes, 2);
        assert_eq!(acc.usb_minutes, 1);
        assert_eq!(acc.mode_minutes[Mode::Menu.slot()], 4);
    }

    #[test]
    fn test_switchon_and_poweroff_saturate() {
        let mut acc = UsageAccumulator::zeroed();
        for _ in 0..300 {
            acc.note_switch_on();
            acc.note_reprogram();
            acc.add_poweroff_day();
        }
        assert_eq!(acc.switchon_count, u8::MAX);
        assert_eq!(acc.reprogram_count, u8::MAX);
        assert_eq!(acc.poweroff_days, u8::MAX);
    }

    #[test]
    fn test_zeroed_validates() {
        assert!(UsageAccumulator::zeroed().validate());
    }

    #[test]
    fn test_seal_then_validate() {
        let mut acc = UsageAccumulator::zeroed();
        acc.tick_poweron(Some(Mode::Explorer), BATTERY);
        acc.mark_feature_used(FeatureFlag::Motor);
        assert!(!acc.validate());

        acc.seal();
        assert!(acc.validate());
    }

    #[test]
    fn test_any_field_mutation_breaks_seal() {
        let mut base = UsageAccumulator::zeroed();
        base.poweron_minutes = 90;
        base.studio_minutes = 12;
        base.usb_minutes = 7;
        base.switchon_count = 3;
        base.mode_minutes[Mode::Follow.slot()] = 40;
        base.mark_feature_used(FeatureFlag::Ir);
        base.seal();

        let mutations: [fn(&mut UsageAccumulator); 9] = [
            |a| a.poweron_minutes += 1,
            |a| a.studio_minutes += 1,
            |a| a.usb_minutes += 1,
            |a| a.switchon_count += 1,
            |a| a.reprogram_count += 1,
            |a| a.mode_minutes[UNKNOWN_MODE_SLOT] += 1,
            |a| a.mode_minutes[Mode::Follow.slot()] -= 1,
            |a| a.poweroff_days += 1,
            |a| a.mark_feature_used(FeatureFlag::Rc5),
        ];

        for mutate in mutations {
            let mut acc = base;
            mutate(&mut acc);
            assert!(!acc.validate(), "mutation went undetected: {:?}", acc);
        }
    }

    #[test]
    fn test_image_serialization() {
        let mut acc = UsageAccumulator::zeroed();
        acc.poweron_minutes = 0x0102;
        acc.studio_minutes = 5;
        acc.reprogram_count = 2;
        acc.poweroff_days = 1;
        acc.mode_minutes[Mode::Sound.slot()] = 9;
        acc.mark_feature_used(FeatureFlag::Accelerometer);
        acc.seal();

        let bytes = acc.to_bytes();
        assert_eq!(&bytes[0..2], &[0x02, 0x01]);
        assert_eq!(bytes[7], 2);

        let decoded = UsageAccumulator::from_bytes(&bytes);
        assert_eq!(decoded, acc);
        assert!(decoded.validate());
    }
}
