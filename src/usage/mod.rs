//! Usage telemetry types: feature flags, operating modes, and the RAM accumulator.

pub mod accumulator;
pub mod retained;

pub use accumulator::*;
pub use retained::*;

use serde::{Deserialize, Serialize};

/// Number of defined feature flags (bits 0..=17)
pub const FLAG_COUNT: usize = 18;

/// Number of bytes the flag set occupies in every persisted layout
pub const FLAG_BYTES: usize = 3;

/// Number of histogram slots: one per [`Mode`] plus the "no mode" slot
pub const MODE_SLOTS: usize = Mode::COUNT + 1;

/// Histogram slot used when no behaviour mode is active (a user VM program runs)
pub const UNKNOWN_MODE_SLOT: usize = Mode::COUNT;

/// A hardware capability that was referenced or used at least once.
///
/// The discriminant is the bit position in the persisted 3-byte flag field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureFlag {
    /// Reserved. Never set in RAM, so a written record's leading byte is never erased.
    Internal = 0,
    /// A brownout reset was observed at boot
    Brownout = 1,
    /// The VM reported an internal error
    VmBug = 2,
    /// VM bytecode was loaded from the SD card
    VmCodeSd = 3,
    /// A sound file was played from the SD card
    PlaybackSd = 4,
    /// VM bytecode was loaded from program flash
    FlashVmCode = 5,
    /// Sound was recorded to the SD card
    RecordSd = 6,
    Motor = 7,
    /// Proximity or ground infrared sensors
    Ir = 8,
    /// Temperature sensor
    Ntc = 9,
    Sound = 10,
    LedIr = 11,
    LedRgb = 12,
    LedCircle = 13,
    Accelerometer = 14,
    Buttons = 15,
    /// Microphone level or threshold
    SoundThreshold = 16,
    /// RC5 infrared remote receiver
    Rc5 = 17,
}

impl FeatureFlag {
    pub const ALL: [FeatureFlag; FLAG_COUNT] = [
        Self::Internal,
        Self::Brownout,
        Self::VmBug,
        Self::VmCodeSd,
        Self::PlaybackSd,
        Self::FlashVmCode,
        Self::RecordSd,
        Self::Motor,
        Self::Ir,
        Self::Ntc,
        Self::Sound,
        Self::LedIr,
        Self::LedRgb,
        Self::LedCircle,
        Self::Accelerometer,
        Self::Buttons,
        Self::SoundThreshold,
        Self::Rc5,
    ];

    pub const fn bit(self) -> u32 {
        1 << (self as u8)
    }

    /// Short label for logs and reports
    pub const fn label(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Brownout => "brownout",
            Self::VmBug => "vm-bug",
            Self::VmCodeSd => "vm-code-sd",
            Self::PlaybackSd => "playback-sd",
            Self::FlashVmCode => "flash-vm-code",
            Self::RecordSd => "record-sd",
            Self::Motor => "motor",
            Self::Ir => "ir",
            Self::Ntc => "ntc",
            Self::Sound => "sound",
            Self::LedIr => "led-ir",
            Self::LedRgb => "led-rgb",
            Self::LedCircle => "led-circle",
            Self::Accelerometer => "acc",
            Self::Buttons => "buttons",
            Self::SoundThreshold => "sound-threshold",
            Self::Rc5 => "rc5",
        }
    }
}

/// Monotone set of [`FeatureFlag`]s. Bits can be set but never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags(u32);

impl FeatureFlags {
    const MASK: u32 = (1 << FLAG_COUNT) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, flag: FeatureFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Set one flag. Idempotent.
    pub fn insert(&mut self, flag: FeatureFlag) {
        self.0 |= flag.bit();
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Same set with the reserved internal bit cleared, as written to flash
    pub const fn without_internal(self) -> Self {
        Self(self.0 & !FeatureFlag::Internal.bit())
    }

    pub const fn to_bytes(self) -> [u8; FLAG_BYTES] {
        [self.0 as u8, (self.0 >> 8) as u8, (self.0 >> 16) as u8]
    }

    /// Decode the persisted flag bytes. Bits beyond the defined flags are dropped.
    pub const fn from_bytes(bytes: [u8; FLAG_BYTES]) -> Self {
        let raw = bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16;
        Self(raw & Self::MASK)
    }

    pub fn iter(self) -> impl Iterator<Item = FeatureFlag> {
        FeatureFlag::ALL
            .into_iter()
            .filter(move |flag| self.contains(*flag))
    }

    /// Labels of every set flag, in bit order
    pub fn labels(self) -> heapless::Vec<&'static str, FLAG_COUNT> {
        let mut labels = heapless::Vec::new();
        for flag in self.iter() {
            // Capacity equals the number of defined flags
            let _ = labels.push(flag.label());
        }
        labels
    }
}

impl From<FeatureFlag> for FeatureFlags {
    fn from(flag: FeatureFlag) -> Self {
        Self(flag.bit())
    }
}

/// Built-in behaviour modes selectable from the device menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Menu,
    Follow,
    Explorer,
    Accelerometer,
    Line,
    Rc5,
    Sound,
}

impl Mode {
    pub const COUNT: usize = 7;

    pub const ALL: [Mode; Self::COUNT] = [
        Self::Menu,
        Self::Follow,
        Self::Explorer,
        Self::Accelerometer,
        Self::Line,
        Self::Rc5,
        Self::Sound,
    ];

    /// Histogram slot for this mode
    pub const fn slot(self) -> usize {
        self as usize
    }

    /// Histogram slot for an optional mode; `None` maps to [`UNKNOWN_MODE_SLOT`]
    pub const fn slot_of(mode: Option<Mode>) -> usize {
        match mode {
            Some(mode) => mode.slot(),
            None => UNKNOWN_MODE_SLOT,
        }
    }
}

/// Power-source observation taken at a power-on tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerState {
    /// External (USB) supply is present
    pub external_power: bool,
    /// The host communication channel is open (a studio session is attached)
    pub channel_open: bool,
}
