//! Heap-organized table file: an unordered sequence of [`HeapPage`]s.

use crate::concurrency::Permissions;
use crate::storage::buffer::{BufferPool, PageRef};
use crate::storage::catalog::PageStore;
use crate::storage::disk::{PageManager, PAGE_SIZE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::heap_page::MAX_TUPLE_SIZE;
use crate::storage::page::{HeapPage, Page, PageId, RecordId, TableId, Tuple};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::Path;

pub struct HeapFile {
    table_id: TableId,
    pages: Mutex<PageManager>,
}

impl HeapFile {
    pub fn create(path: &Path, table_id: TableId) -> StorageResult<Self> {
        Ok(Self {
            table_id,
            pages: Mutex::new(PageManager::create(path)?),
        })
    }

    pub fn open(path: &Path, table_id: TableId) -> StorageResult<Self> {
        Ok(Self {
            table_id,
            pages: Mutex::new(PageManager::open(path)?),
        })
    }

    fn check_table(&self, page_id: PageId) -> StorageResult<()> {
        if page_id.table_id != self.table_id {
            return Err(StorageError::WrongTable {
                page: page_id,
                table: self.table_id,
            });
        }
        Ok(())
    }

    /// Appends an empty page straight to disk and returns its id.
    fn append_page(&self) -> StorageResult<PageId> {
        let mut pages = self.pages.lock();
        let page_id = PageId::new(self.table_id, pages.num_pages()?);
        pages.write_page(page_id.page_no, &HeapPage::empty(page_id).page_data())?;
        debug!("appended page {}", page_id);
        Ok(page_id)
    }

    fn insert_into(
        page: &PageRef<HeapPage>,
        txn: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<()> {
        let mut guard = page.write();
        let slot = guard.insert_tuple(&tuple.data)?;
        guard.mark_dirty(true, txn);
        tuple.record_id = Some(RecordId::new(guard.id(), slot));
        Ok(())
    }
}

impl PageStore<HeapPage> for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn read_page(&self, page_id: PageId) -> StorageResult<HeapPage> {
        self.check_table(page_id)?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.pages.lock().read_page(page_id.page_no, &mut buf)?;
        HeapPage::from_bytes(page_id, &buf)
    }

    fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        self.check_table(page.id())?;
        self.pages
            .lock()
            .write_page(page.id().page_no, &page.page_data())
    }

    fn num_pages(&self) -> StorageResult<u32> {
        self.pages.lock().num_pages()
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool<HeapPage>,
        txn: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageRef<HeapPage>>> {
        if tuple.data.len() > MAX_TUPLE_SIZE {
            return Err(StorageError::PageFull {
                required: tuple.data.len(),
                available: MAX_TUPLE_SIZE,
            });
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(txn, page_id);

            let page = pool.get_page(txn, page_id, Permissions::Shared)?;
            let has_room = page.read().has_room_for(tuple.data.len());
            if !has_room {
                // Only the header was read, so a lock taken just for this check can go
                if !held_before {
                    pool.release_page(txn, page_id);
                }
                continue;
            }

            let page = pool.get_page(txn, page_id, Permissions::Exclusive)?;
            Self::insert_into(&page, txn, tuple)?;
            return Ok(vec![page]);
        }

        let page_id = self.append_page()?;
        let page = pool.get_page(txn, page_id, Permissions::Exclusive)?;
        Self::insert_into(&page, txn, tuple)?;
        Ok(vec![page])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool<HeapPage>,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> StorageResult<Vec<PageRef<HeapPage>>> {
        let record_id = tuple.record_id.ok_or(StorageError::MissingRecordId)?;
        self.check_table(record_id.page_id)?;

        let page = pool.get_page(txn, record_id.page_id, Permissions::Exclusive)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(record_id.slot)?;
            guard.mark_dirty(true, txn);
        }
        Ok(vec![page])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferPoolConfig;
    use crate::storage::Catalog;
    use anyhow::Result;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const TABLE: TableId = TableId(1);

    fn setup() -> Result<(TempDir, Arc<HeapFile>, BufferPool<HeapPage>)> {
        let dir = tempdir()?;
        let file = Arc::new(HeapFile::create(&dir.path().join("t.tbl"), TABLE)?);
        let catalog: Arc<Catalog<HeapPage>> = Arc::new(Catalog::new());
        catalog.add_table(file.clone());
        let config = BufferPoolConfig::new(8).with_lock_timeout(Duration::from_millis(50));
        Ok((dir, file, BufferPool::new(config, catalog)))
    }

    #[test]
    fn test_read_write_page() -> Result<()> {
        let (_dir, file, _pool) = setup()?;

        let mut page = HeapPage::empty(PageId::new(TABLE, 0));
        page.insert_tuple(b"on disk")?;
        file.write_page(&page)?;
        assert_eq!(file.num_pages()?, 1);

        let read = file.read_page(PageId::new(TABLE, 0))?;
        assert_eq!(read.tuple(0)?, b"on disk");
        assert!(!read.is_dirty());

        assert!(matches!(
            file.read_page(PageId::new(TableId(2), 0)),
            Err(StorageError::WrongTable { .. })
        ));
        assert!(matches!(
            file.read_page(PageId::new(TABLE, 3)),
            Err(StorageError::PageOutOfRange { page_no: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_insert_appends_then_fills() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId(1);

        let mut first = Tuple::new(vec![1u8; 1500]);
        let pages = file.insert_tuple(&pool, txn, &mut first)?;
        assert_eq!(pages.len(), 1);
        assert_eq!(file.num_pages()?, 1);
        assert_eq!(first.record_id, Some(RecordId::new(PageId::new(TABLE, 0), 0)));
        assert_eq!(pages[0].read().dirtier(), Some(txn));

        let mut second = Tuple::new(vec![2u8; 1500]);
        file.insert_tuple(&pool, txn, &mut second)?;
        assert_eq!(second.record_id, Some(RecordId::new(PageId::new(TABLE, 0), 1)));

        // Page 0 is out of room now
        let mut third = Tuple::new(vec![3u8; 1500]);
        file.insert_tuple(&pool, txn, &mut third)?;
        assert_eq!(third.record_id, Some(RecordId::new(PageId::new(TABLE, 1), 0)));
        assert_eq!(file.num_pages()?, 2);

        assert!(pool.holds_lock(txn, PageId::new(TABLE, 0)));
        assert!(pool.holds_lock(txn, PageId::new(TABLE, 1)));
        Ok(())
    }

    #[test]
    fn test_full_page_scan_releases_lock() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let writer = TransactionId(1);
        let other = TransactionId(2);

        let mut big = Tuple::new(vec![0u8; 4000]);
        file.insert_tuple(&pool, writer, &mut big)?;
        pool.complete(writer, true)?;

        let mut small = Tuple::new(vec![9u8; 200]);
        file.insert_tuple(&pool, other, &mut small)?;
        assert_eq!(small.record_id.map(|rid| rid.page_id.page_no), Some(1));
        assert!(!pool.holds_lock(other, PageId::new(TABLE, 0)));
        Ok(())
    }

    #[test]
    fn test_insert_rejects_oversized_tuple() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let mut huge = Tuple::new(vec![0u8; PAGE_SIZE]);

        assert!(matches!(
            file.insert_tuple(&pool, TransactionId(1), &mut huge),
            Err(StorageError::PageFull { .. })
        ));
        assert_eq!(file.num_pages()?, 0);
        Ok(())
    }

    #[test]
    fn test_delete_tuple() -> Result<()> {
        let (_dir, file, pool) = setup()?;
        let txn = TransactionId(1);

        let mut tuple = Tuple::new(b"short lived".to_vec());
        file.insert_tuple(&pool, txn, &mut tuple)?;
        let pages = file.delete_tuple(&pool, txn, &tuple)?;

        assert_eq!(pages[0].read().tuples().count(), 0);
        assert!(matches!(
            file.delete_tuple(&pool, txn, &Tuple::new(b"never stored".to_vec())),
            Err(StorageError::MissingRecordId)
        ));
        Ok(())
    }
}
