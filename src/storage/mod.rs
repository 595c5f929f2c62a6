//! Two-page append-only usage log in program flash.
//!
//! Each page holds one [`Header`] with running totals followed by fixed-size
//! [`Record`] slots. When a page fills up it is folded (header + records) into
//! a fresh header on the other page, so each page is erased once per
//! generation instead of once per record.

pub mod aggregate;
pub mod flash;
pub mod layout;
pub mod pages;
#[cfg(any(test, feature = "ram-flash"))]
pub mod ram_flash;
pub mod writer;

pub use flash::{PageId, ProgramFlash, SlotAddress};
pub use layout::{HEADER_VERSION, Header, RECORDS_PER_PAGE, Record};
pub use pages::{FlashPageManager, PageStats, SlotState};
#[cfg(any(test, feature = "ram-flash"))]
pub use ram_flash::{RamFlash, RamFlashError};
pub use writer::{FormatOutcome, RecordWriter, WriteOutcome};

use thiserror_no_std::Error;

/// Flash failure, with the driver error already logged where it happened
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("flash read failed at offset {offset}")]
    Read { offset: usize },
    #[error("flash erase failed on {page}")]
    Erase { page: PageId },
    #[error("flash program failed at offset {offset}")]
    Program { offset: usize },
}
