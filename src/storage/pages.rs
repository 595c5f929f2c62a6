use log::{debug, error, info};

use super::StorageError;
use super::flash::{PageId, ProgramFlash, SlotAddress};
use super::layout::{
    ERASED, HEADER_SIZE, HEADER_VERSION, Header, RECORD_SIZE, RECORDS_PER_PAGE, Record,
    WRITE_CHUNK,
};

/// State of one record slot as read back from flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Still fully erased, may be programmed
    Free,
    /// Commit byte erased but body partly programmed: a write was interrupted.
    /// Neither reused nor aggregated.
    Torn,
    Used(Record),
}

/// Counters for page lifecycle events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages retired by folding them into a fresh header on the other page
    pub rotations: u32,
    /// Times both pages were found full and one had to be force-erased.
    /// Stays zero under normal rotation.
    pub forced_recoveries: u32,
}

/// Owner of the two-page log region.
///
/// Exactly one page receives new records at a time; the other is either
/// uninitialized or holds the previous generation, already folded into the
/// active page's header.
pub struct FlashPageManager<F> {
    flash: F,
    stats: PageStats,
}

impl<F: ProgramFlash> FlashPageManager<F> {
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            stats: PageStats::default(),
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    pub fn stats(&self) -> PageStats {
        self.stats
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.flash.read(offset, buf).map_err(|e| {
            error!("Flash read of {} bytes at {} failed: {:?}", buf.len(), offset, e);
            StorageError::Read { offset }
        })
    }

    fn program_chunk(&mut self, offset: usize, chunk: &[u8]) -> Result<(), StorageError> {
        self.flash.program(offset, chunk).map_err(|e| {
            error!("Flash program at {} failed: {:?}", offset, e);
            StorageError::Program { offset }
        })
    }

    /// Program `bytes` at `offset`, leading chunk last.
    ///
    /// The leading chunk carries the commit marker (header version, record
    /// commit byte), so an interrupted write never looks complete.
    fn program_committed(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        for (index, chunk) in bytes.chunks(WRITE_CHUNK).enumerate().skip(1) {
            self.program_chunk(offset + index * WRITE_CHUNK, chunk)?;
        }
        self.program_chunk(offset, &bytes[..WRITE_CHUNK])
    }

    pub fn read_header(&mut self, page: PageId) -> Result<Header, StorageError> {
        let mut bytes = [0u8; HEADER_SIZE];
        self.read(page.base(), &mut bytes)?;
        Ok(Header::from_bytes(&bytes))
    }

    /// True iff the page header carries the current layout version
    pub fn is_initialized(&mut self, page: PageId) -> Result<bool, StorageError> {
        Ok(self.read_header(page)?.is_current_version())
    }

    pub fn slot_state(&mut self, address: SlotAddress) -> Result<SlotState, StorageError> {
        let mut bytes = [0u8; RECORD_SIZE];
        self.read(address.offset(), &mut bytes)?;

        Ok(if bytes[0] != ERASED {
            SlotState::Used(Record::from_bytes(&bytes))
        } else if bytes.iter().all(|&b| b == ERASED) {
            SlotState::Free
        } else {
            SlotState::Torn
        })
    }

    /// First free slot of `page`, or `None` when the page is full
    pub fn find_free_slot(&mut self, page: PageId) -> Result<Option<SlotAddress>, StorageError> {
        for slot in 0..RECORDS_PER_PAGE {
            let address = SlotAddress { page, slot };
            match self.slot_state(address)? {
                SlotState::Free => return Ok(Some(address)),
                SlotState::Torn => debug!("Skipping torn record at {}", address),
                SlotState::Used(_) => {}
            }
        }
        Ok(None)
    }

    /// Seed totals from the page header and fold in every committed record.
    ///
    /// An uninitialized page contributes nothing from its header.
    pub fn sum_stats(&mut self, page: PageId) -> Result<Header, StorageError> {
        let header = self.read_header(page)?;
        let mut totals = if header.is_current_version() {
            header
        } else {
            Header::zeroed()
        };

        for slot in 0..RECORDS_PER_PAGE {
            if let SlotState::Used(record) = self.slot_state(SlotAddress { page, slot })? {
                totals.absorb(&record);
            }
        }

        totals.version = HEADER_VERSION;
        Ok(totals)
    }

    /// Erase `target` and write a new header: zero totals, or the aggregate of
    /// `source` when given.
    pub fn init_page(&mut self, target: PageId, source: Option<PageId>) -> Result<(), StorageError> {
        let header = match source {
            Some(source) => self.sum_stats(source)?,
            None => Header::zeroed(),
        };

        self.flash.erase(target).map_err(|e| {
            error!("Flash erase of {} failed: {:?}", target, e);
            StorageError::Erase { page: target }
        })?;
        self.program_committed(target.base(), &header.to_bytes())?;

        match source {
            Some(source) => info!(
                "Initialized {} from {}: {} min on, {} switch-ons",
                target, source, header.poweron_minutes, header.switchon
            ),
            None => info!("Initialized {} with zero totals", target),
        }
        Ok(())
    }

    /// Retire `from` into a fresh header on `into` and hand out `into`'s first slot
    fn rotate(&mut self, from: PageId, into: PageId) -> Result<SlotAddress, StorageError> {
        self.init_page(into, Some(from))?;
        self.stats.rotations += 1;
        Ok(SlotAddress::first(into))
    }

    /// Rotate `from` into the other page ahead of time, so the next append
    /// finds a slot without any page being full on both sides.
    pub fn prepare_next_page(&mut self, from: PageId) -> Result<(), StorageError> {
        self.rotate(from, from.other()).map(|_| ())
    }

    /// Format page zero when neither page carries a valid header.
    ///
    /// Returns whether a format happened.
    pub fn ensure_formatted(&mut self) -> Result<bool, StorageError> {
        if self.is_initialized(PageId::Zero)? || self.is_initialized(PageId::One)? {
            return Ok(false);
        }
        self.init_page(PageId::Zero, None)?;
        Ok(true)
    }

    /// Locate the slot the next record goes to, rotating pages as needed.
    pub fn next_free_slot(&mut self) -> Result<SlotAddress, StorageError> {
        let first = PageId::Zero;
        let second = PageId::One;

        if !self.is_initialized(first)? {
            if !self.is_initialized(second)? {
                self.init_page(first, None)?;
                return Ok(SlotAddress::first(first));
            }
            if let Some(address) = self.find_free_slot(second)? {
                return Ok(address);
            }
            return self.rotate(second, first);
        }

        if let Some(address) = self.find_free_slot(first)? {
            return Ok(address);
        }
        if !self.is_initialized(second)? {
            return self.rotate(first, second);
        }
        if let Some(address) = self.find_free_slot(second)? {
            return Ok(address);
        }

        // Unreachable while every full page gets rotated right after its last
        // write. Records of the first page that were not yet retired are lost.
        self.stats.forced_recoveries += 1;
        error!(
            "Both log pages full, force-erasing {} (recovery #{})",
            first, self.stats.forced_recoveries
        );
        self.rotate(second, first)
    }

    /// Program `record` into a slot previously returned by [`Self::next_free_slot`]
    pub fn write_record(&mut self, address: SlotAddress, record: &Record) -> Result<(), StorageError> {
        self.program_committed(address.offset(), &record.to_bytes())?;
        debug!("Record committed to {}", address);
        Ok(())
    }

    /// Page holding the newest lineage, if any page is initialized.
    ///
    /// A page with a free slot is the one receiving records. When both pages
    /// are full (a preemptive rotation was interrupted) the newer page is the
    /// one whose totals already include the other's.
    pub fn active_page(&mut self) -> Result<Option<PageId>, StorageError> {
        let mut newest: Option<(PageId, Header)> = None;
        for page in PageId::BOTH {
            if !self.is_initialized(page)? {
                continue;
            }
            if self.find_free_slot(page)?.is_some() {
                return Ok(Some(page));
            }

            let totals = self.sum_stats(page)?;
            let newer = match &newest {
                Some((_, best)) => lineage_rank(&totals) > lineage_rank(best),
                None => true,
            };
            if newer {
                newest = Some((page, totals));
            }
        }
        Ok(newest.map(|(page, _)| page))
    }
}

/// Totals only grow along a lineage, so a later generation never ranks lower
fn lineage_rank(totals: &Header) -> (u32, u16, u16, u16) {
    (
        totals.poweron_minutes,
        totals.switchon,
        totals.poweroff_days,
        totals.reprogram,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ram_flash::RamFlash;
    use crate::usage::{FeatureFlag, FeatureFlags};

    fn record(poweron: u16, flag: FeatureFlag) -> Record {
        Record {
            flags: flag.into(),
            poweron_minutes: poweron,
            switchon: 1,
            ..Record::default()
        }
    }

    fn fill(manager: &mut FlashPageManager<RamFlash>, page: PageId, poweron: u16) {
        for slot in 0..RECORDS_PER_PAGE {
            manager
                .write_record(SlotAddress { page, slot }, &record(poweron, FeatureFlag::Ir))
                .unwrap();
        }
    }

    #[test]
    fn test_fresh_flash_formats_page_zero() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        assert!(!manager.is_initialized(PageId::Zero).unwrap());

        let address = manager.next_free_slot().unwrap();
        assert_eq!(address, SlotAddress::first(PageId::Zero));
        assert!(manager.is_initialized(PageId::Zero).unwrap());
        assert!(!manager.is_initialized(PageId::One).unwrap());
        assert_eq!(manager.read_header(PageId::Zero).unwrap(), Header::zeroed());
    }

    #[test]
    fn test_ensure_formatted_only_once() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        assert!(manager.ensure_formatted().unwrap());
        assert!(!manager.ensure_formatted().unwrap());
        assert_eq!(manager.flash().erase_count(PageId::Zero), 1);
    }

    #[test]
    fn test_slots_fill_in_order() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        for expected in 0..3 {
            let address = manager.next_free_slot().unwrap();
            assert_eq!(address, SlotAddress { page: PageId::Zero, slot: expected });
            manager.write_record(address, &record(10, FeatureFlag::Motor)).unwrap();
        }
        assert!(matches!(
            manager.slot_state(SlotAddress { page: PageId::Zero, slot: 1 }).unwrap(),
            SlotState::Used(r) if r.poweron_minutes == 10
        ));
    }

    #[test]
    fn test_full_page_zero_rotates_into_uninitialized_page_one() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::Zero, None).unwrap();
        fill(&mut manager, PageId::Zero, 20);

        let address = manager.next_free_slot().unwrap();
        assert_eq!(address, SlotAddress::first(PageId::One));
        assert_eq!(manager.stats().rotations, 1);

        let header = manager.read_header(PageId::One).unwrap();
        assert_eq!(header.poweron_minutes, 20 * RECORDS_PER_PAGE as u32);
        assert_eq!(header.switchon, RECORDS_PER_PAGE as u16);
        assert_eq!(header.flags, FeatureFlags::from(FeatureFlag::Ir));
    }

    #[test]
    fn test_both_pages_full_reseeds_page_zero_from_page_one() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::Zero, None).unwrap();
        fill(&mut manager, PageId::Zero, 1);
        manager.prepare_next_page(PageId::Zero).unwrap();
        fill(&mut manager, PageId::One, 2);

        // Page zero is full of already-retired records, page one is full
        let address = manager.next_free_slot().unwrap();
        assert_eq!(address, SlotAddress::first(PageId::Zero));
        assert_eq!(manager.stats().forced_recoveries, 1);

        let header = manager.read_header(PageId::Zero).unwrap();
        assert_eq!(header.poweron_minutes, 3 * RECORDS_PER_PAGE as u32);
    }

    #[test]
    fn test_page_zero_erased_with_page_one_active() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::One, None).unwrap();
        manager
            .write_record(SlotAddress::first(PageId::One), &record(5, FeatureFlag::Rc5))
            .unwrap();

        let address = manager.next_free_slot().unwrap();
        assert_eq!(address, SlotAddress { page: PageId::One, slot: 1 });
        assert!(!manager.is_initialized(PageId::Zero).unwrap());
    }

    #[test]
    fn test_page_zero_erased_with_page_one_full() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::One, None).unwrap();
        fill(&mut manager, PageId::One, 4);

        let address = manager.next_free_slot().unwrap();
        assert_eq!(address, SlotAddress::first(PageId::Zero));
        assert_eq!(manager.stats().rotations, 1);
        assert_eq!(manager.stats().forced_recoveries, 0);
        assert_eq!(
            manager.read_header(PageId::Zero).unwrap().poweron_minutes,
            4 * RECORDS_PER_PAGE as u32
        );
    }

    #[test]
    fn test_sum_stats_includes_header() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::Zero, None).unwrap();
        fill(&mut manager, PageId::Zero, 3);
        manager.prepare_next_page(PageId::Zero).unwrap();
        manager
            .write_record(SlotAddress::first(PageId::One), &record(7, FeatureFlag::Ntc))
            .unwrap();

        let totals = manager.sum_stats(PageId::One).unwrap();
        assert_eq!(totals.poweron_minutes, 3 * RECORDS_PER_PAGE as u32 + 7);
        assert!(totals.flags.contains(FeatureFlag::Ir));
        assert!(totals.flags.contains(FeatureFlag::Ntc));
    }

    #[test]
    fn test_torn_record_is_skipped() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::Zero, None).unwrap();

        // Body chunks land, the commit chunk does not
        manager.flash_mut().cut_power_after(RECORD_SIZE / WRITE_CHUNK - 1);
        let first = SlotAddress::first(PageId::Zero);
        assert_eq!(
            manager.write_record(first, &record(9, FeatureFlag::Motor)),
            Err(StorageError::Program { offset: first.offset() })
        );
        manager.flash_mut().restore_power();

        assert_eq!(manager.slot_state(first).unwrap(), SlotState::Torn);
        assert_eq!(
            manager.next_free_slot().unwrap(),
            SlotAddress { page: PageId::Zero, slot: 1 }
        );
        assert_eq!(manager.sum_stats(PageId::Zero).unwrap(), Header::zeroed());
    }

    #[test]
    fn test_torn_header_reads_uninitialized() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        // Erase and body chunks land, the version chunk does not
        manager.flash_mut().cut_power_after(HEADER_SIZE / WRITE_CHUNK);
        assert!(manager.init_page(PageId::Zero, None).is_err());
        manager.flash_mut().restore_power();

        assert!(!manager.is_initialized(PageId::Zero).unwrap());
    }

    #[test]
    fn test_active_page() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        assert_eq!(manager.active_page().unwrap(), None);

        manager.init_page(PageId::Zero, None).unwrap();
        assert_eq!(manager.active_page().unwrap(), Some(PageId::Zero));

        fill(&mut manager, PageId::Zero, 1);
        assert_eq!(manager.active_page().unwrap(), Some(PageId::Zero));

        manager.prepare_next_page(PageId::Zero).unwrap();
        assert_eq!(manager.active_page().unwrap(), Some(PageId::One));
    }

    #[test]
    fn test_active_page_with_both_pages_full_is_newest() {
        let mut manager = FlashPageManager::new(RamFlash::new());
        manager.init_page(PageId::Zero, None).unwrap();
        fill(&mut manager, PageId::Zero, 10);
        manager.prepare_next_page(PageId::Zero).unwrap();
        fill(&mut manager, PageId::One, 10);

        // Page one's header already carries page zero
        assert_eq!(manager.active_page().unwrap(), Some(PageId::One));
        let totals = manager.sum_stats(PageId::One).unwrap();
        assert_eq!(totals.poweron_minutes, 2 * 10 * RECORDS_PER_PAGE as u32);

        manager.prepare_next_page(PageId::One).unwrap();
        fill(&mut manager, PageId::Zero, 10);
        assert_eq!(manager.active_page().unwrap(), Some(PageId::Zero));
    }
}
