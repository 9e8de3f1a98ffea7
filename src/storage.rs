//! Storage layer for pagepool.
//!
//! Pages are fixed-size (4KB) units cached by the buffer pool and persisted
//! by a per-table page store. Key components:
//!
//! - **Page**: capability trait every cached page implements (identity,
//!   dirty marker, before-image)
//! - **HeapPage**: slotted page holding variable-length tuples
//! - **PageManager**: raw page I/O against a single file
//! - **HeapFile**: the page store for one table, built on a PageManager
//! - **Catalog**: resolves a table id to its page store
//! - **BufferPool**: bounded page cache with page-level locking and
//!   transaction commit/abort

pub mod buffer;
pub mod catalog;
pub mod disk;
pub mod error;
pub mod heap_file;
pub mod page;

pub use buffer::{BufferPool, PageRef};
pub use catalog::{Catalog, PageStore};
pub use disk::{PageManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use heap_file::HeapFile;
pub use page::{HeapPage, Page, PageId, RecordId, TableId, Tuple};
