use thiserror::Error;

use super::types::{PageId, RecordId, SlotId, TableId};
use crate::transaction::TransactionId;

/// Database error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("{txn} aborted: granting its request on {page_id} would deadlock")]
    TransactionAborted { txn: TransactionId, page_id: PageId },

    #[error("{txn} gave up waiting for the lock on {page_id}")]
    LockWaitTimeout { txn: TransactionId, page_id: PageId },

    #[error("Buffer pool is full: none of its {capacity} resident pages can be evicted")]
    CacheExhausted { capacity: usize },

    #[error("Page {0} is full")]
    PageFull(PageId),

    #[error("Tuple schema does not match the schema of {0}")]
    SchemaMismatch(PageId),

    #[error("Tuple at {record_id} is not stored on {page_id}")]
    TupleNotOnPage { record_id: RecordId, page_id: PageId },

    #[error("Slot {} of {page_id} is already empty", slot_id.0)]
    SlotAlreadyEmpty { page_id: PageId, slot_id: SlotId },

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Corrupt page {page_id}: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Page {page_id} is beyond the end of a {num_pages}-page file")]
    PageOutOfRange { page_id: PageId, num_pages: u32 },

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} already exists")]
    TableAlreadyExists(TableId),
}

impl StrataError {
    /// Returns true if the caller must roll the whole transaction back.
    pub fn is_transaction_abort(&self) -> bool {
        matches!(
            self,
            StrataError::TransactionAborted { .. } | StrataError::LockWaitTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
