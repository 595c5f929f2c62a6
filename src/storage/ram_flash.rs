//! In-memory flash with NOR program/erase semantics.
//!
//! Used by unit tests and by the host simulator. A power cut can be scheduled
//! after a number of program or erase operations to exercise torn writes and
//! interrupted rotations.

use thiserror_no_std::Error;

use super::flash::{PageId, ProgramFlash};
use super::layout::{ERASED, PAGE_SIZE, REGION_SIZE, WRITE_CHUNK};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamFlashError {
    #[error("access of {len} bytes at offset {offset} is outside the region")]
    OutOfBounds { offset: usize, len: usize },
    #[error("program chunk of {0} bytes, expected one program word")]
    ChunkSize(usize),
    #[error("power lost")]
    PowerLost,
}

pub struct RamFlash {
    cells: [u8; REGION_SIZE],
    /// Program or erase operations left before the simulated power cut
    operations_until_cut: Option<usize>,
    erase_count: [u32; 2],
}

impl RamFlash {
    /// A factory-fresh (fully erased) region
    pub const fn new() -> Self {
        Self {
            cells: [ERASED; REGION_SIZE],
            operations_until_cut: None,
            erase_count: [0; 2],
        }
    }

    /// Restore a region image, e.g. one saved by a previous simulator run.
    /// Missing bytes read as erased.
    pub fn from_image(image: &[u8]) -> Self {
        let mut flash = Self::new();
        let len = image.len().min(REGION_SIZE);
        flash.cells[..len].copy_from_slice(&image[..len]);
        flash
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    pub fn page_bytes(&self, page: PageId) -> &[u8] {
        &self.cells[page.base()..page.base() + PAGE_SIZE]
    }

    /// Number of erase cycles each page went through
    pub fn erase_count(&self, page: PageId) -> u32 {
        self.erase_count[page.index()]
    }

    /// Let `operations` more program or erase operations succeed, then fail
    /// every one after
    pub fn cut_power_after(&mut self, operations: usize) {
        self.operations_until_cut = Some(operations);
    }

    pub fn restore_power(&mut self) {
        self.operations_until_cut = None;
    }

    fn spend_operation(&mut self) -> Result<(), RamFlashError> {
        if let Some(left) = self.operations_until_cut.as_mut() {
            if *left == 0 {
                return Err(RamFlashError::PowerLost);
            }
            *left -= 1;
        }
        Ok(())
    }

    fn check_bounds(offset: usize, len: usize) -> Result<(), RamFlashError> {
        if offset.checked_add(len).is_none_or(|end| end > REGION_SIZE) {
            return Err(RamFlashError::OutOfBounds { offset, len });
        }
        Ok(())
    }
}

impl Default for RamFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramFlash for RamFlash {
    type Error = RamFlashError;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        Self::check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.cells[offset..offset + buf.len()]);
        Ok(())
    }

    fn erase(&mut self, page: PageId) -> Result<(), Self::Error> {
        self.spend_operation()?;
        self.cells[page.base()..page.base() + PAGE_SIZE].fill(ERASED);
        self.erase_count[page.index()] += 1;
        Ok(())
    }

    fn program(&mut self, offset: usize, chunk: &[u8]) -> Result<(), Self::Error> {
        if chunk.len() != WRITE_CHUNK {
            return Err(RamFlashError::ChunkSize(chunk.len()));
        }
        Self::check_bounds(offset, chunk.len())?;

        self.spend_operation()?;

        // NOR cells can only go from 1 to 0
        for (cell, byte) in self.cells[offset..offset + chunk.len()].iter_mut().zip(chunk) {
            *cell &= *byte;
        }
        Ok(())
    }
}
