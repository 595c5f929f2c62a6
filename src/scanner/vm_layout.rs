//! Event identifiers and variable-table addresses exposed by the firmware to
//! compiled programs, and which [`FeatureFlag`] each one reveals.
//!
//! These numbers are part of the compiled-program ABI. Changing any of them
//! breaks programs already stored on devices.

use crate::usage::FeatureFlag;

/// Local event identifiers count down from here
pub const LOCAL_EVENTS_START: u16 = 0xFFFE;

/// Local events, in firmware declaration order
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEvent {
    ButtonBackward = 0,
    ButtonLeft,
    ButtonCenter,
    ButtonForward,
    ButtonRight,
    Buttons,
    Prox,
    Tap,
    Acc,
    Mic,
    SoundFinished,
    Temperature,
    Rc5,
    Motor,
    Timer0,
    Timer1,
}

impl LocalEvent {
    /// Identifier as it appears in a program's event table
    pub const fn id(self) -> u16 {
        LOCAL_EVENTS_START - self as u16
    }
}

/// Feature revealed by a handler for `event_id`, if any
pub fn event_feature(event_id: u16) -> Option<FeatureFlag> {
    use LocalEvent::*;

    const TABLE: [(LocalEvent, FeatureFlag); 12] = [
        (ButtonBackward, FeatureFlag::Buttons),
        (ButtonLeft, FeatureFlag::Buttons),
        (ButtonCenter, FeatureFlag::Buttons),
        (ButtonForward, FeatureFlag::Buttons),
        (ButtonRight, FeatureFlag::Buttons),
        (Buttons, FeatureFlag::Buttons),
        (Prox, FeatureFlag::Ir),
        (Tap, FeatureFlag::Accelerometer),
        (Acc, FeatureFlag::Accelerometer),
        (Mic, FeatureFlag::SoundThreshold),
        (Rc5, FeatureFlag::Rc5),
        (Motor, FeatureFlag::Motor),
    ];

    TABLE
        .iter()
        .find(|(event, _)| event.id() == event_id)
        .map(|(_, flag)| *flag)
}

/// Variable-table word addresses.
///
/// | Address   | Variable            |
/// |-----------|---------------------|
/// | 0         | id                  |
/// | 1         | source              |
/// | 2..=33    | args                |
/// | 34..=35   | fwversion           |
/// | 36        | productid           |
/// | 37..=41   | buttons (raw)       |
/// | 42..=46   | buttons_state       |
/// | 47..=56   | buttons mean, noise |
/// | 57..=63   | prox                |
/// | 64..=69   | ground ambiant, reflected, delta |
/// | 70..=71   | motor target        |
/// | 72..=79   | vbat, imot, speed, pwm |
/// | 80..=82   | acc                 |
/// | 83        | ntc                 |
/// | 84..=85   | rc5 address, command |
/// | 86        | sound_level         |
/// | 87        | sound_tresh         |
/// | 88        | sound_mean          |
/// | 89..=91   | timer period, acc_tap |
pub mod var {
    pub const BUTTONS_STATE: u16 = 42;
    pub const PROX: u16 = 57;
    pub const GROUND_AMBIANT: u16 = 64;
    pub const GROUND_REFLECTED: u16 = 66;
    pub const GROUND_DELTA: u16 = 68;
    pub const MOTOR_TARGET: u16 = 70;
    pub const VBAT: u16 = 72;
    pub const ACC: u16 = 80;
    pub const NTC: u16 = 83;
    pub const RC5_ADDRESS: u16 = 84;
    pub const RC5_COMMAND: u16 = 85;
    pub const SOUND_LEVEL: u16 = 86;
    pub const SOUND_THRESHOLD: u16 = 87;
}

/// Contiguous run of variable addresses tied to one feature
#[derive(Debug, Clone, Copy)]
struct VariableRange {
    first: u16,
    last: u16,
    flag: FeatureFlag,
}

impl VariableRange {
    const fn new(first: u16, len: u16, flag: FeatureFlag) -> Self {
        Self {
            first,
            last: first + len - 1,
            flag,
        }
    }

    const fn contains(&self, address: u16) -> bool {
        address >= self.first && address <= self.last
    }
}

/// Sensor variables: reading one of them means the program uses the sensor
const READ_RANGES: [VariableRange; 10] = [
    VariableRange::new(var::BUTTONS_STATE, 5, FeatureFlag::Buttons),
    VariableRange::new(var::PROX, 7, FeatureFlag::Ir),
    VariableRange::new(var::GROUND_AMBIANT, 2, FeatureFlag::Ir),
    VariableRange::new(var::GROUND_REFLECTED, 2, FeatureFlag::Ir),
    VariableRange::new(var::GROUND_DELTA, 2, FeatureFlag::Ir),
    VariableRange::new(var::ACC, 3, FeatureFlag::Accelerometer),
    VariableRange::new(var::NTC, 1, FeatureFlag::Ntc),
    VariableRange::new(var::RC5_ADDRESS, 1, FeatureFlag::Rc5),
    VariableRange::new(var::RC5_COMMAND, 1, FeatureFlag::Rc5),
    VariableRange::new(var::SOUND_LEVEL, 1, FeatureFlag::SoundThreshold),
];

/// Actuator variables: writing one of them means the program drives the actuator
const WRITE_RANGES: [VariableRange; 2] = [
    VariableRange::new(var::MOTOR_TARGET, 2, FeatureFlag::Motor),
    VariableRange::new(var::SOUND_THRESHOLD, 1, FeatureFlag::SoundThreshold),
];

fn lookup(ranges: &[VariableRange], address: u16) -> Option<FeatureFlag> {
    ranges
        .iter()
        .find(|range| range.contains(address))
        .map(|range| range.flag)
}

/// Feature revealed by reading the variable at `address`.
///
/// Indirect accesses only carry the array base, which is what gets checked.
pub fn read_feature(address: u16) -> Option<FeatureFlag> {
    lookup(&READ_RANGES, address)
}

/// Feature revealed by writing the variable at `address`
pub fn write_feature(address: u16) -> Option<FeatureFlag> {
    lookup(&WRITE_RANGES, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_count_down() {
        assert_eq!(LocalEvent::ButtonBackward.id(), 0xFFFE);
        assert_eq!(LocalEvent::Prox.id(), 0xFFF8);
        assert_eq!(LocalEvent::Motor.id(), 0xFFF1);
    }

    #[test]
    fn test_event_features() {
        assert_eq!(event_feature(LocalEvent::ButtonCenter.id()), Some(FeatureFlag::Buttons));
        assert_eq!(event_feature(LocalEvent::Tap.id()), Some(FeatureFlag::Accelerometer));
        assert_eq!(event_feature(LocalEvent::Mic.id()), Some(FeatureFlag::SoundThreshold));
        assert_eq!(event_feature(LocalEvent::Timer0.id()), None);
        // Global (user) events carry small ids
        assert_eq!(event_feature(3), None);
    }

    #[test]
    fn test_read_ranges_bounds() {
        assert_eq!(read_feature(var::BUTTONS_STATE), Some(FeatureFlag::Buttons));
        assert_eq!(read_feature(var::BUTTONS_STATE + 4), Some(FeatureFlag::Buttons));
        assert_eq!(read_feature(var::BUTTONS_STATE + 5), None);
        assert_eq!(read_feature(var::PROX + 6), Some(FeatureFlag::Ir));
        assert_eq!(read_feature(var::GROUND_DELTA + 1), Some(FeatureFlag::Ir));
        assert_eq!(read_feature(var::ACC + 2), Some(FeatureFlag::Accelerometer));
        assert_eq!(read_feature(var::NTC), Some(FeatureFlag::Ntc));
        assert_eq!(read_feature(var::RC5_COMMAND), Some(FeatureFlag::Rc5));
        assert_eq!(read_feature(var::VBAT), None);
    }

    #[test]
    fn test_reads_and_writes_are_independent() {
        // Reading a motor target or the threshold reveals nothing
        assert_eq!(read_feature(var::MOTOR_TARGET), None);
        assert_eq!(read_feature(var::SOUND_THRESHOLD), None);
        // Writing a sensor variable reveals nothing
        assert_eq!(write_feature(var::PROX), None);
        assert_eq!(write_feature(var::SOUND_LEVEL), None);

        assert_eq!(write_feature(var::MOTOR_TARGET + 1), Some(FeatureFlag::Motor));
        assert_eq!(write_feature(var::SOUND_THRESHOLD), Some(FeatureFlag::SoundThreshold));
    }
}
