//! Transaction handle bound to a buffer pool.

use super::id::{TransactionId, TransactionIdGenerator};
use crate::concurrency::Permissions;
use crate::storage::{BufferPool, Page, PageId, PageRef, StorageResult, TableId, Tuple};
use log::warn;

/// A running transaction. Rolls back on drop unless committed or aborted.
pub struct Transaction<P: Page> {
    id: TransactionId,
    pool: BufferPool<P>,
    finished: bool,
}

impl<P: Page> Transaction<P> {
    pub fn begin(pool: &BufferPool<P>, ids: &TransactionIdGenerator) -> Self {
        Self {
            id: ids.next(),
            pool: pool.clone(),
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn get_page(&self, page_id: PageId, perm: Permissions) -> StorageResult<PageRef<P>> {
        self.pool.get_page(self.id, page_id, perm)
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> StorageResult<()> {
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> StorageResult<()> {
        self.pool.delete_tuple(self.id, tuple)
    }

    /// Commits the transaction. If flushing fails the handle is dropped and
    /// the transaction rolls back.
    pub fn commit(mut self) -> StorageResult<()> {
        self.pool.complete(self.id, true)?;
        self.finished = true;
        Ok(())
    }

    pub fn abort(mut self) -> StorageResult<()> {
        self.finished = true;
        self.pool.complete(self.id, false)
    }
}

impl<P: Page> Drop for Transaction<P> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.pool.complete(self.id, false) {
                warn!("rollback of {} on drop failed: {}", self.id, err);
            }
        }
    }
}
