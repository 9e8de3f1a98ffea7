//! Table directory: resolves a table id to the page store that owns its pages.

use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, TableId, Tuple};
use crate::transaction::TransactionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Durable home of one table's pages.
///
/// Mutations fetch the pages they touch through `pool` under an exclusive
/// lock, mark them dirty for `txn`, and return them so the pool can keep its
/// cache coherent.
pub trait PageStore<P: Page>: Send + Sync {
    fn table_id(&self) -> TableId;

    fn read_page(&self, page_id: PageId) -> StorageResult<P>;

    fn write_page(&self, page: &P) -> StorageResult<()>;

    fn num_pages(&self) -> StorageResult<u32>;

    /// Stores the tuple and sets its record id.
    fn insert_tuple(
        &self,
        pool: &BufferPool<P>,
        txn: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageRef<P>>>;

    fn delete_tuple(
        &self,
        pool: &BufferPool<P>,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef<P>>>;
}

pub struct Catalog<P: Page> {
    stores: RwLock<HashMap<TableId, Arc<dyn PageStore<P>>>>,
}

impl<P: Page> Catalog<P> {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a store under its table id, replacing any previous one.
    pub fn add_table(&self, store: Arc<dyn PageStore<P>>) -> Option<Arc<dyn PageStore<P>>> {
        self.stores.write().insert(store.table_id(), store)
    }

    pub fn store(&self, table_id: TableId) -> StorageResult<Arc<dyn PageStore<P>>> {
        self.stores
            .read()
            .get(&table_id)
            .cloned()
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<_> = self.stores.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl<P: Page> Default for Catalog<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{HeapFile, HeapPage};
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_register_and_resolve() -> Result<()> {
        let dir = tempdir()?;
        let catalog: Catalog<HeapPage> = Catalog::new();
        assert!(matches!(
            catalog.store(TableId(1)),
            Err(StorageError::TableNotFound(TableId(1)))
        ));

        let users = Arc::new(HeapFile::create(&dir.path().join("users.tbl"), TableId(2))?);
        let orders = Arc::new(HeapFile::create(&dir.path().join("orders.tbl"), TableId(1))?);
        assert!(catalog.add_table(users).is_none());
        assert!(catalog.add_table(orders).is_none());

        assert_eq!(catalog.table_ids(), vec![TableId(1), TableId(2)]);
        assert_eq!(catalog.store(TableId(2))?.table_id(), TableId(2));

        let replacement = Arc::new(HeapFile::create(&dir.path().join("users2.tbl"), TableId(2))?);
        assert!(catalog.add_table(replacement).is_some());
        assert_eq!(catalog.table_ids().len(), 2);

        Ok(())
    }
}
