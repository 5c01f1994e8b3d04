//! Heap storage engine for Grain
//!
//! This crate provides the lowest storage tier: fixed-size slotted pages
//! holding fixed-length records, laid out sequentially in a single file
//! behind a 12-byte file header.
//!
//! Two intrusive free lists keep allocation O(1):
//!
//! * a per-page free-slot list threaded through the bytes of deleted slots,
//!   so slot indices are recycled without rewriting the page;
//! * a per-file free-page list threaded through the page headers, holding
//!   every page with at least one reusable slot.
//!
//! All on-disk integers are little-endian `i32`s. Big-endian targets are
//! rejected at compile time so the in-memory header views and the byte
//! codecs agree on the same format.

#[cfg(not(target_endian = "little"))]
compile_error!("grain-storage pins its on-disk format to little-endian targets");

pub mod device;
pub mod file;
pub mod page;
pub mod record;

pub use device::{FileDevice, MemDevice, StorageDevice};
pub use file::{FileHeader, HeapFile, RecordId, Scan};
pub use page::{HeapPage, PageHeader, FREE_SLOT_END, MAX_SLOTS, PAGE_SIZE};
pub use record::{Record, RECORD_SIZE};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrainError {
    #[error("invalid slot index {slot_idx} for page {page_id}")]
    InvalidSlot { page_id: i32, slot_idx: i32 },

    #[error("page {0} is full")]
    PageFull(i32),

    #[error("invalid page id {0}")]
    InvalidPageId(i32),

    /// Reserved for by-key lookups in higher tiers; never raised here.
    #[error("record not found")]
    RecordNotFound,

    #[error("corrupt file header")]
    CorruptHeader,

    #[error("failed to open file: {0}")]
    FileOpenFailed(#[source] std::io::Error),

    #[error("file read failed: {0}")]
    FileReadFailed(#[source] std::io::Error),

    #[error("file write failed: {0}")]
    FileWriteFailed(#[source] std::io::Error),

    #[error("file seek failed: {0}")]
    FileSeekFailed(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GrainError>;
