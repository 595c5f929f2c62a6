//! Folding records into running totals.
//!
//! Counters add (saturating, so an overflowing total reads as "at least N")
//! and flags OR together.

use super::layout::{Header, Record};
use crate::usage::UsageAccumulator;

impl Header {
    /// Fold one retired record into these totals
    pub fn absorb(&mut self, record: &Record) {
        self.switchon = self.switchon.saturating_add(u16::from(record.switchon));
        self.poweron_minutes = self
            .poweron_minutes
            .saturating_add(u32::from(record.poweron_minutes));
        self.studio_minutes = self.studio_minutes.saturating_add(record.studio_minutes);
        self.usb_minutes = self.usb_minutes.saturating_add(record.usb_minutes);
        self.reprogram = self.reprogram.saturating_add(u16::from(record.reprogram));
        for (total, minutes) in self.mode_minutes.iter_mut().zip(record.mode_minutes) {
            *total = total.saturating_add(u16::from(minutes));
        }
        self.poweroff_days = self
            .poweroff_days
            .saturating_add(u16::from(record.poweroff_days));
        self.flags = self.flags.union(record.flags);
    }

    /// Fold the unflushed accumulator in as if it had been written as a record
    pub fn absorb_pending(&mut self, acc: &UsageAccumulator) {
        self.absorb(&Record::from(acc));
    }
}
