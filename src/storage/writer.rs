use log::{debug, warn};

use super::StorageError;
use super::flash::{PageId, ProgramFlash, SlotAddress};
use super::layout::{RECORDS_PER_PAGE, Record};
use super::pages::FlashPageManager;
use crate::board::Board;
use crate::usage::UsageAccumulator;

/// Result of a flush attempt that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(SlotAddress),
    /// Supply too low to program flash safely; nothing was written
    LowSupply { sample: u16 },
}

impl WriteOutcome {
    pub const fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOutcome {
    /// A page already carries a valid header; the supply was not sampled
    AlreadyFormatted,
    Formatted,
    /// Supply too low to erase flash safely; nothing was touched
    LowSupply { sample: u16 },
}

/// Commits accumulator snapshots as records.
pub struct RecordWriter<F> {
    pages: FlashPageManager<F>,
    min_supply_sample: u16,
}

impl<F: ProgramFlash> RecordWriter<F> {
    pub fn new(pages: FlashPageManager<F>, min_supply_sample: u16) -> Self {
        Self {
            pages,
            min_supply_sample,
        }
    }

    pub fn pages(&self) -> &FlashPageManager<F> {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut FlashPageManager<F> {
        &mut self.pages
    }

    /// Format page zero when neither page carries a valid header, behind the
    /// same supply gate as a record write.
    pub fn ensure_formatted<B: Board>(
        &mut self,
        board: &mut B,
    ) -> Result<FormatOutcome, StorageError> {
        if self.pages.is_initialized(PageId::Zero)? || self.pages.is_initialized(PageId::One)? {
            return Ok(FormatOutcome::AlreadyFormatted);
        }

        if let Err(sample) = self.check_supply(board) {
            warn!(
                "Supply sample {} below {}, postponing log format",
                sample, self.min_supply_sample
            );
            return Ok(FormatOutcome::LowSupply { sample });
        }

        self.pages.ensure_formatted()?;
        Ok(FormatOutcome::Formatted)
    }

    /// Write `usage` as one record.
    ///
    /// Waits for a fresh supply sample first (see [`Board::wait_for_supply_sample`]).
    /// The accumulator is never modified here; clearing it after a successful
    /// write is the caller's job.
    pub fn write_record<B: Board>(
        &mut self,
        board: &mut B,
        usage: &UsageAccumulator,
    ) -> Result<WriteOutcome, StorageError> {
        if let Err(sample) = self.check_supply(board) {
            warn!(
                "Supply sample {} below {}, postponing flush",
                sample, self.min_supply_sample
            );
            return Ok(WriteOutcome::LowSupply { sample });
        }

        let record = Record::from(usage);
        let address = self.pages.next_free_slot()?;
        self.pages.write_record(address, &record)?;

        if address.slot == RECORDS_PER_PAGE - 1 {
            // The record is committed; the next lookup copes with a half-done rotation
            if let Err(e) = self.pages.prepare_next_page(address.page) {
                warn!("Could not prepare the page after {}: {}", address.page, e);
            }
        }

        debug!("Flushed {} power-on minutes to {}", record.poweron_minutes, address);
        Ok(WriteOutcome::Written(address))
    }

    /// Take a fresh supply sample; `Err` carries it when too low to program flash
    fn check_supply<B: Board>(&self, board: &mut B) -> Result<(), u16> {
        let sample = board.wait_for_supply_sample();
        if sample < self.min_supply_sample {
            return Err(sample);
        }
        Ok(())
    }
}
