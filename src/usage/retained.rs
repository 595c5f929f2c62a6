//! Reset-surviving home of the usage accumulator.
//!
//! On the device a single [`RetainedUsage`] lives in a `static` placed in RAM
//! that the startup code does not initialize, so its contents survive a
//! controlled reset. Whatever is found there at boot is only trusted if its CRC
//! validates.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use super::{IMAGE_LEN, UsageAccumulator};

/// Accumulator guarded for access from tick handlers and the flush path.
///
/// Every read or mutation happens inside one critical section, so the flush
/// path never observes a half-applied tick.
pub struct RetainedUsage {
    inner: Mutex<CriticalSectionRawMutex, RefCell<UsageAccumulator>>,
}

impl RetainedUsage {
    pub const fn new() -> Self {
        Self::with_accumulator(UsageAccumulator::zeroed())
    }

    pub const fn with_accumulator(accumulator: UsageAccumulator) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(accumulator)),
        }
    }

    /// Rebuild from a retained image carried across a (simulated) reset.
    pub fn from_image(image: &[u8; IMAGE_LEN]) -> Self {
        Self::with_accumulator(UsageAccumulator::from_bytes(image))
    }

    /// Run `f` with exclusive access to the accumulator.
    pub fn with<R>(&self, f: impl FnOnce(&mut UsageAccumulator) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> UsageAccumulator {
        self.inner.lock(|cell| *cell.borrow())
    }

    /// Raw image including the stored CRC, as it would sit in retained RAM
    pub fn image(&self) -> [u8; IMAGE_LEN] {
        self.snapshot().to_bytes()
    }
}

impl Default for RetainedUsage {
    fn default() -> Self {
        Self::new()
    }
}
