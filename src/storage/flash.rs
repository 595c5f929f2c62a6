use core::fmt::{Debug, Display};

use super::layout::{HEADER_SIZE, PAGE_SIZE, RECORD_SIZE};

/// Program-memory primitives backing the two-page log region.
///
/// Offsets are byte offsets from the start of the region. Programming can only
/// clear bits; only an erase sets them back to `ERASED`.
pub trait ProgramFlash {
    type Error: Debug;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Erase one whole page
    fn erase(&mut self, page: PageId) -> Result<(), Self::Error>;

    /// Program one `WRITE_CHUNK`-sized chunk at `offset`
    fn program(&mut self, offset: usize, chunk: &[u8]) -> Result<(), Self::Error>;
}

/// One of the two log pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageId {
    Zero,
    One,
}

impl PageId {
    pub const BOTH: [PageId; 2] = [PageId::Zero, PageId::One];

    pub const fn other(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }

    /// Offset of the page's header within the region
    pub const fn base(self) -> usize {
        self.index() * PAGE_SIZE
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "page {}", self.index())
    }
}

/// Location of one record slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAddress {
    pub page: PageId,
    pub slot: usize,
}

impl SlotAddress {
    pub const fn first(page: PageId) -> Self {
        Self { page, slot: 0 }
    }

    pub const fn offset(self) -> usize {
        self.page.base() + HEADER_SIZE + self.slot * RECORD_SIZE
    }
}

impl Display for SlotAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} slot {}", self.page, self.slot)
    }
}
