use serde::{Deserialize, Serialize};

/// Tunables for the usage log.
///
/// Defaults reproduce the firmware constants; hosts may deserialize an
/// override (the simulator does) but the embedded target uses [`LogConfig::DEFAULT`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum supply-voltage sample, in raw ADC units, required before flash is
    /// programmed. 656 is ~3.3 V on the battery divider.
    pub min_supply_sample: u16,
    /// A boot-time flush is triggered once more than this many power-on minutes
    /// have accumulated.
    pub flush_after_minutes: u16,
    /// Number of low-power wakeup quanta (~0.5 s each) that make up one day.
    pub sleep_quanta_per_day: u32,
    /// Number of raw power-on ticks (milliseconds) that make up one minute quantum.
    pub poweron_ticks_per_minute: u32,
}

impl LogConfig {
    pub const DEFAULT: Self = Self {
        min_supply_sample: 656,
        flush_after_minutes: 24 * 60,
        sleep_quanta_per_day: 24 * 3600 * 2,
        poweron_ticks_per_minute: 60 * 1000,
    };
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
