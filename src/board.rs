//! Board signals the usage log samples: supply voltage, power source, brownout
//! latch, and the active behaviour mode.

use crate::usage::{Mode, PowerState};

pub trait Board {
    /// Start a fresh supply-voltage conversion, discarding any earlier sample
    fn request_supply_sample(&mut self);

    /// Sample of the conversion started by [`Board::request_supply_sample`],
    /// in raw ADC units, once available
    fn poll_supply_sample(&mut self) -> Option<u16>;

    fn external_power_present(&mut self) -> bool;

    /// The host communication channel (studio session) is open
    fn channel_open(&mut self) -> bool;

    /// Read and clear the brownout-reset latch
    fn take_brownout(&mut self) -> bool;

    /// Active behaviour mode, `None` while a user VM program runs
    fn current_mode(&mut self) -> Option<Mode>;

    /// Request a conversion and spin until it completes.
    ///
    /// There is no timeout: a board whose converter never completes stalls here.
    fn wait_for_supply_sample(&mut self) -> u16 {
        self.request_supply_sample();
        loop {
            if let Some(sample) = self.poll_supply_sample() {
                return sample;
            }
            core::hint::spin_loop();
        }
    }

    fn power_state(&mut self) -> PowerState {
        PowerState {
            external_power: self.external_power_present(),
            channel_open: self.channel_open(),
        }
    }
}
