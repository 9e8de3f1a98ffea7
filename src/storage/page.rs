pub mod heap_page;

use crate::transaction::TransactionId;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use heap_page::HeapPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table{}", self.0)
    }
}

/// Identifies a page: the owning table plus the page number within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Location of a tuple: page plus slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

/// An opaque tuple payload and, once stored, where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub record_id: Option<RecordId>,
    pub data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            record_id: None,
            data: data.into(),
        }
    }
}

/// What the buffer pool needs from a cached page.
///
/// Snapshot and dirty tracking live on the page itself, so the pool can
/// roll a page back without knowing its concrete layout.
pub trait Page: Send + Sync + 'static {
    fn id(&self) -> PageId;

    /// The transaction that last dirtied this page, or `None` if it is clean.
    fn dirtier(&self) -> Option<TransactionId>;

    fn mark_dirty(&mut self, dirty: bool, txn: TransactionId);

    /// A clean copy of the page as it was at the last baseline.
    fn before_image(&self) -> Self
    where
        Self: Sized;

    /// Makes the current contents the new baseline.
    fn set_before_image(&mut self);

    /// Serialized page contents, exactly `PAGE_SIZE` bytes.
    fn page_data(&self) -> Vec<u8>;

    fn is_dirty(&self) -> bool {
        self.dirtier().is_some()
    }
}
