//! Storage layer error types.

use crate::storage::page::{PageId, TableId};
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{txn} timed out waiting for a lock on page {page}")]
    LockTimeout { txn: TransactionId, page: PageId },

    #[error("Buffer pool exhausted: all {capacity} resident pages are dirty")]
    PoolExhausted { capacity: usize },

    #[error("Buffer pool exhausted: {pinned} of {capacity} resident pages are clean but pinned by live page handles")]
    PagesPinned { capacity: usize, pinned: usize },

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Page {page_no} is out of range (file has {num_pages} pages)")]
    PageOutOfRange { page_no: u32, num_pages: u32 },

    #[error("Page {page} does not belong to table {table}")]
    WrongTable { page: PageId, table: TableId },

    #[error("Tuple not found: slot {slot_id} on page {page} is empty or deleted")]
    TupleNotFound { page: PageId, slot_id: u16 },

    #[error("Invalid slot ID: {slot_id} (max: {max_slot})")]
    InvalidSlotId { slot_id: u16, max_slot: u16 },

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Corrupt page: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True when the failure means the calling transaction should abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::LockTimeout { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
