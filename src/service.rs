//! Entry points the rest of the firmware calls: boot, periodic ticks, the VM
//! hook and the pre-reset hook.
//!
//! ## Usage
//!
//! ```rust,ignore
//! static USAGE: RetainedUsage = RetainedUsage::new();
//!
//! let mut log = LogService::new(&USAGE, flash, board, LogConfig::DEFAULT);
//! log.init();
//!
//! // 1 ms timer
//! log.tick_poweron_ms();
//! // every VM execution cycle
//! log.on_vm_cycle(&vm.bytecode);
//! // before any controlled reset
//! log.prepare_reset();
//! ```

use log::{error, info, warn};

use crate::board::Board;
use crate::config::LogConfig;
use crate::scanner::scan_program;
use crate::storage::{
    FlashPageManager, FormatOutcome, Header, PageStats, ProgramFlash, RecordWriter, SlotAddress,
    StorageError, WriteOutcome,
};
use crate::usage::{FeatureFlag, RetainedUsage};

/// What happened to the flush attempted by [`LogService::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Boot-time trigger not reached, nothing attempted
    NotDue,
    Written(SlotAddress),
    /// Supply too low; counters kept for the next boot
    Postponed { sample: u16 },
    /// Flash failed; counters kept for the next boot
    Failed(StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    /// Retained counters passed their CRC check and were kept
    pub restored: bool,
    pub brownout: bool,
    pub flush: FlushStatus,
}

pub struct LogService<'a, F, B> {
    usage: &'a RetainedUsage,
    writer: RecordWriter<F>,
    board: B,
    config: LogConfig,
    /// Raw power-on ticks since the last minute quantum
    poweron_ticks: u32,
    /// Sleep quanta since the last accounted day
    sleep_quanta: u32,
}

impl<'a, F, B> LogService<'a, F, B>
where
    F: ProgramFlash,
    B: Board,
{
    pub fn new(usage: &'a RetainedUsage, flash: F, board: B, config: LogConfig) -> Self {
        Self {
            usage,
            writer: RecordWriter::new(FlashPageManager::new(flash), config.min_supply_sample),
            board,
            config,
            poweron_ticks: 0,
            sleep_quanta: 0,
        }
    }

    /// Boot-time entry point. Call once, before the periodic ticks start.
    pub fn init(&mut self) -> BootReport {
        let restored = self.usage.with(|acc| {
            if acc.validate() {
                true
            } else {
                acc.clear();
                false
            }
        });
        if !restored {
            warn!("Retained usage counters failed their CRC check, starting from zero");
        }

        let brownout = self.board.take_brownout();
        if brownout {
            self.mark_feature_used(FeatureFlag::Brownout);
        }

        match self.writer.ensure_formatted(&mut self.board) {
            Ok(FormatOutcome::LowSupply { sample }) => {
                warn!("Usage log left unformatted at supply sample {}", sample)
            }
            Ok(_) => {}
            Err(e) => error!("Could not format the usage log: {}", e),
        }

        let flush_after = self.config.flush_after_minutes;
        let due = self
            .usage
            .with(|acc| acc.poweroff_days > 0 || acc.poweron_minutes > flush_after);
        let flush = if due { self.flush() } else { FlushStatus::NotDue };

        self.usage.with(|acc| acc.note_switch_on());

        info!(
            "Usage log ready: restored={} brownout={} flush={:?}",
            restored, brownout, flush
        );
        BootReport {
            restored,
            brownout,
            flush,
        }
    }

    /// Commit the current counters as one record and zero them on success.
    ///
    /// Periodic ticks must be held off while this runs: the snapshot and the
    /// final clear are separate steps.
    pub fn flush(&mut self) -> FlushStatus {
        let snapshot = self.usage.snapshot();

        match self.writer.write_record(&mut self.board, &snapshot) {
            Ok(WriteOutcome::Written(address)) => {
                self.usage.with(|acc| acc.clear());
                FlushStatus::Written(address)
            }
            Ok(WriteOutcome::LowSupply { sample }) => FlushStatus::Postponed { sample },
            Err(e) => {
                error!("Usage flush failed, keeping counters: {}", e);
                FlushStatus::Failed(e)
            }
        }
    }

    /// Seal the counters so the next boot accepts them. Call right before any
    /// controlled reset.
    pub fn prepare_reset(&self) {
        self.usage.with(|acc| acc.seal());
    }

    /// One power-on minute elapsed
    pub fn tick_poweron(&mut self) {
        let mode = self.board.current_mode();
        let power = self.board.power_state();
        self.usage.with(|acc| acc.tick_poweron(mode, power));
    }

    /// Raw millisecond tick; every `poweron_ticks_per_minute` calls make a minute
    pub fn tick_poweron_ms(&mut self) {
        self.poweron_ticks += 1;
        if self.poweron_ticks >= self.config.poweron_ticks_per_minute {
            self.poweron_ticks = 0;
            self.tick_poweron();
        }
    }

    /// One low-power wakeup quantum elapsed
    pub fn tick_poweroff(&mut self) {
        self.sleep_quanta += 1;
        if self.sleep_quanta >= self.config.sleep_quanta_per_day {
            self.sleep_quanta = 0;
            self.usage.with(|acc| acc.add_poweroff_day());
        }
    }

    /// Record the features referenced by the program the VM is running
    pub fn on_vm_cycle(&mut self, program: &[u16]) {
        let flags = scan_program(program);
        if !flags.is_empty() {
            self.usage.with(|acc| acc.mark_features_used(flags));
        }
    }

    pub fn mark_feature_used(&self, flag: FeatureFlag) {
        self.usage.with(|acc| acc.mark_feature_used(flag));
    }

    /// New bytecode was installed in the VM
    pub fn note_reprogram(&self) {
        self.usage.with(|acc| acc.note_reprogram());
    }

    /// Everything ever logged: the active page's totals plus the unflushed counters
    pub fn lifetime_totals(&mut self) -> Result<Header, StorageError> {
        let pages = self.writer.pages_mut();
        let mut totals = match pages.active_page()? {
            Some(page) => pages.sum_stats(page)?,
            None => Header::zeroed(),
        };
        totals.absorb_pending(&self.usage.snapshot());
        Ok(totals)
    }

    pub fn page_stats(&self) -> PageStats {
        self.writer.pages().stats()
    }

    pub fn usage(&self) -> &'a RetainedUsage {
        self.usage
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn flash(&self) -> &F {
        self.writer.pages().flash()
    }

    pub fn flash_mut(&mut self) -> &mut F {
        self.writer.pages_mut().flash_mut()
    }
}
