pub mod lru;
pub mod replacer;

use crate::concurrency::{LockManager, Permissions};
use crate::config::BufferPoolConfig;
use crate::storage::catalog::Catalog;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, TableId, Tuple};
use crate::transaction::TransactionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// A cache slot. `pin_count` counts the live [`PageRef`]s handed out for it;
/// the pool's own bookkeeping holds the `Arc` without pinning.
struct Frame<P> {
    page: RwLock<P>,
    pin_count: AtomicUsize,
}

impl<P: Page> Frame<P> {
    fn new(page: P) -> Self {
        Self {
            page: RwLock::new(page),
            pin_count: AtomicUsize::new(0),
        }
    }

    fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::SeqCst) > 0
    }

    /// `None` when the page is write-locked and its state can't be observed.
    fn is_dirty(&self) -> Option<bool> {
        self.page.try_read().map(|page| page.is_dirty())
    }
}

/// Pinned handle to a resident page. A pinned page is never evicted; the pin
/// is dropped with the last clone of the handle.
///
/// Rollback replaces the contents in place, so outstanding handles stay
/// coherent with the cache.
pub struct PageRef<P: Page> {
    frame: Arc<Frame<P>>,
}

impl<P: Page> PageRef<P> {
    fn pin(frame: &Arc<Frame<P>>) -> Self {
        frame.pin_count.fetch_add(1, Ordering::SeqCst);
        Self {
            frame: Arc::clone(frame),
        }
    }

    /// True when both handles point at the same cached frame.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.frame, &other.frame)
    }
}

impl<P: Page> Clone for PageRef<P> {
    fn clone(&self) -> Self {
        Self::pin(&self.frame)
    }
}

impl<P: Page> Deref for PageRef<P> {
    type Target = RwLock<P>;

    fn deref(&self) -> &Self::Target {
        &self.frame.page
    }
}

impl<P: Page> Drop for PageRef<P> {
    fn drop(&mut self) {
        self.frame.pin_count.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded page cache with page-level two-mode locking.
///
/// Pages are only handed out after the requesting transaction holds a lock
/// on them. Dirty pages are never evicted (no-steal): they reach disk when
/// their transaction commits, and are restored from their before-image when
/// it aborts.
pub struct BufferPool<P: Page> {
    inner: Arc<BufferPoolInner<P>>,
}

struct BufferPoolInner<P: Page> {
    config: BufferPoolConfig,
    catalog: Arc<Catalog<P>>,
    lock_manager: LockManager,
    page_table: DashMap<PageId, Arc<Frame<P>>>,
    replacer: Mutex<Box<dyn Replacer>>,
    /// Frames in use, counting loads that are still in flight.
    resident: AtomicUsize,
}

impl<P: Page> Clone for BufferPool<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Page> BufferPool<P> {
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog<P>>) -> Self {
        let replacer = Box::new(LruReplacer::new(config.capacity));
        Self::with_replacer(config, catalog, replacer)
    }

    pub fn with_replacer(
        config: BufferPoolConfig,
        catalog: Arc<Catalog<P>>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                lock_manager: LockManager::with_stripes(config.lock_stripes),
                page_table: DashMap::with_capacity(config.capacity),
                replacer: Mutex::new(replacer),
                resident: AtomicUsize::new(0),
                catalog,
                config,
            }),
        }
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<Catalog<P>> {
        &self.inner.catalog
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.inner.page_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.page_table.is_empty()
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.page_table.contains_key(&page_id)
    }

    /// Locks `page_id` for `txn` and returns the page, loading it if needed.
    ///
    /// Blocks for at most the configured lock timeout. A timeout comes back
    /// as [`StorageError::LockTimeout`] and the caller should abort `txn`.
    /// The lock stays held until the transaction completes or the page is
    /// released explicitly.
    pub fn get_page(
        &self,
        txn: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> StorageResult<PageRef<P>> {
        self.inner
            .lock_manager
            .acquire(page_id, txn, perm, self.inner.config.lock_timeout)?;
        self.fetch(page_id)
    }

    /// Drops `txn`'s lock on a single page.
    ///
    /// Releasing before the transaction ends gives up isolation for that
    /// page; only callers that know the page was not used (for example a
    /// free-space scan) should do this.
    pub fn release_page(&self, txn: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(page_id, txn);
    }

    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.is_held(txn, page_id)
    }

    pub fn held_pages(&self, txn: TransactionId) -> HashSet<PageId> {
        self.inner.lock_manager.held_pages(txn)
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    /// Adds a tuple to `table_id` on behalf of `txn`.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<()> {
        let store = self.inner.catalog.store(table_id)?;
        let pages = store.insert_tuple(self, txn, tuple)?;
        self.adopt_dirty(txn, pages)
    }

    /// Removes a stored tuple on behalf of `txn`.
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> StorageResult<()> {
        let record_id = tuple.record_id.ok_or(StorageError::MissingRecordId)?;
        let store = self.inner.catalog.store(record_id.page_id.table_id)?;
        let pages = store.delete_tuple(self, txn, tuple)?;
        self.adopt_dirty(txn, pages)
    }

    /// Commits `txn`.
    pub fn transaction_complete(&self, txn: TransactionId) -> StorageResult<()> {
        self.complete(txn, true)
    }

    /// Finishes `txn` and releases every lock it holds.
    ///
    /// On commit, pages dirtied by `txn` are written to their stores first;
    /// a write failure is returned with the locks still held. On abort,
    /// every resident page `txn` held or dirtied is reset to its
    /// before-image. A transaction holding no locks is a no-op.
    pub fn complete(&self, txn: TransactionId, commit: bool) -> StorageResult<()> {
        let held = self.inner.lock_manager.held_pages(txn);
        if held.is_empty() {
            return Ok(());
        }

        if commit {
            self.flush_pages(txn)?;
        } else {
            for frame in self.resident_frames() {
                let touched = {
                    let guard = frame.page.read();
                    held.contains(&guard.id()) || guard.dirtier() == Some(txn)
                };
                if touched {
                    let mut guard = frame.page.write();
                    let restored = guard.before_image();
                    *guard = restored;
                }
            }
        }

        let released = self.inner.lock_manager.release_all(txn);
        debug!(
            "{} {}, released {} locks",
            txn,
            if commit { "committed" } else { "aborted" },
            released.len()
        );
        Ok(())
    }

    /// Writes every dirty resident page to disk.
    ///
    /// This ignores transaction boundaries and can make uncommitted changes
    /// durable; use it only for shutdown or maintenance.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        for frame in self.resident_frames() {
            self.write_back(&frame.page)?;
        }
        Ok(())
    }

    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let frame = self
            .inner
            .page_table
            .get(&page_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(frame) = frame {
            self.write_back(&frame.page)?;
        }
        Ok(())
    }

    /// Writes the resident pages dirtied by `txn`.
    pub fn flush_pages(&self, txn: TransactionId) -> StorageResult<()> {
        for frame in self.resident_frames() {
            let dirtied = frame.page.read().dirtier() == Some(txn);
            if dirtied {
                self.write_back(&frame.page)?;
            }
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it. Locks on the page are
    /// left alone; the next `get_page` reloads it from its store.
    pub fn discard_page(&self, page_id: PageId) {
        if self.inner.page_table.remove(&page_id).is_some() {
            self.release_frame();
            self.inner.replacer.lock().remove(page_id);
            debug!("discarded page {}", page_id);
        }
    }

    /// Pins under the shard lock, so eviction can't slip in between the
    /// lookup and the pin.
    fn cached(&self, page_id: PageId) -> Option<PageRef<P>> {
        self.inner
            .page_table
            .get(&page_id)
            .map(|entry| PageRef::pin(entry.value()))
    }

    /// Unpinned snapshot of the resident frames for whole-pool scans.
    fn resident_frames(&self) -> Vec<Arc<Frame<P>>> {
        self.inner
            .page_table
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn touch(&self, page_id: PageId) {
        self.inner.replacer.lock().record_access(page_id);
    }

    fn fetch(&self, page_id: PageId) -> StorageResult<PageRef<P>> {
        if let Some(page) = self.cached(page_id) {
            self.touch(page_id);
            return Ok(page);
        }

        let store = self.inner.catalog.store(page_id.table_id)?;
        self.reserve_frame()?;

        // The entry holds the shard lock, so concurrent misses on the same
        // page load it once.
        let page = match self.inner.page_table.entry(page_id) {
            Entry::Occupied(entry) => {
                let page = PageRef::pin(entry.get());
                drop(entry);
                self.release_frame();
                page
            }
            Entry::Vacant(entry) => {
                let loaded = match store.read_page(page_id) {
                    Ok(loaded) => loaded,
                    Err(err) => {
                        drop(entry);
                        self.release_frame();
                        return Err(err);
                    }
                };
                let frame = Arc::new(Frame::new(loaded));
                let page = PageRef::pin(&frame);
                entry.insert(frame);
                debug!("loaded page {}", page_id);
                page
            }
        };

        self.touch(page_id);
        Ok(page)
    }

    /// Makes sure the pages a store mutation touched are the cached copies
    /// and carry `txn` as their dirtier.
    fn adopt_dirty(&self, txn: TransactionId, pages: Vec<PageRef<P>>) -> StorageResult<()> {
        for page in pages {
            let page_id = {
                let mut guard = page.write();
                guard.mark_dirty(true, txn);
                guard.id()
            };

            if let Entry::Occupied(mut entry) = self.inner.page_table.entry(page_id) {
                if !Arc::ptr_eq(entry.get(), &page.frame) {
                    entry.insert(Arc::clone(&page.frame));
                }
                continue;
            }

            // The page was discarded while the store held it
            self.reserve_frame()?;
            match self.inner.page_table.entry(page_id) {
                Entry::Occupied(mut entry) => {
                    entry.insert(Arc::clone(&page.frame));
                    drop(entry);
                    self.release_frame();
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::clone(&page.frame));
                }
            }
            self.touch(page_id);
        }
        Ok(())
    }

    /// Flushes one page if dirty and makes its current contents the new baseline.
    fn write_back(&self, page: &RwLock<P>) -> StorageResult<bool> {
        if !page.read().is_dirty() {
            return Ok(false);
        }

        let mut guard = page.write();
        let Some(dirtier) = guard.dirtier() else {
            return Ok(false);
        };

        let page_id = guard.id();
        let store = self.inner.catalog.store(page_id.table_id)?;
        store.write_page(&*guard)?;
        guard.mark_dirty(false, dirtier);
        guard.set_before_image();
        debug!("flushed page {} dirtied by {}", page_id, dirtier);
        Ok(true)
    }

    fn reserve_frame(&self) -> StorageResult<()> {
        let capacity = self.inner.config.capacity;
        loop {
            let resident = self.inner.resident.load(Ordering::SeqCst);
            if resident < capacity {
                if self
                    .inner
                    .resident
                    .compare_exchange(resident, resident + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }
            self.evict_page()?;
        }
    }

    fn release_frame(&self) {
        self.inner.resident.fetch_sub(1, Ordering::SeqCst);
    }

    /// Makes room for one frame, or returns with nothing evicted when the
    /// pool is still settling and the reservation should be retried.
    fn evict_page(&self) -> StorageResult<()> {
        if self.try_evict() {
            return Ok(());
        }
        if let Some(err) = self.exhausted() {
            return Err(err);
        }
        // An unpinned page was mid-flush or mid-rollback, or a load is in flight
        thread::yield_now();
        Ok(())
    }

    /// Removes one clean, unpinned page from the cache. Never writes.
    fn try_evict(&self) -> bool {
        let mut replacer = self.inner.replacer.lock();
        loop {
            let Some(page_id) = replacer.victim(&|page_id| self.is_evictable(page_id)) else {
                return false;
            };

            // Re-checked under the shard lock; a miss means the page went away,
            // got dirty or got pinned
            let removed = self
                .inner
                .page_table
                .remove_if(&page_id, |_, frame| Self::is_clean(frame));
            if removed.is_some() {
                drop(replacer);
                self.release_frame();
                debug!("evicted page {}", page_id);
                return true;
            }
            if self.inner.page_table.contains_key(&page_id) {
                // Still resident, so it must stay a candidate for later
                replacer.record_access(page_id);
            }
        }
    }

    fn is_evictable(&self, page_id: PageId) -> bool {
        // Untracked ids are stale replacer entries and are simply dropped
        self.inner
            .page_table
            .get(&page_id)
            .map_or(true, |entry| Self::is_clean(entry.value()))
    }

    /// Clean and not pinned by any handle.
    fn is_clean(frame: &Frame<P>) -> bool {
        !frame.is_pinned() && frame.is_dirty() == Some(false)
    }

    /// Explains why no victim was found, or `None` when an unpinned frame
    /// may still turn evictable (it was write-locked or freed up meanwhile).
    /// Clean pages held by live handles are reported apart from a pool that
    /// is genuinely all dirty.
    fn exhausted(&self) -> Option<StorageError> {
        let capacity = self.inner.config.capacity;
        let mut pinned = 0;
        for entry in self.inner.page_table.iter() {
            let frame = entry.value();
            match (frame.is_pinned(), frame.is_dirty()) {
                (_, Some(true)) => {}
                (false, _) => return None,
                (true, _) => pinned += 1,
            }
        }
        if self.len() < capacity {
            return None;
        }

        if pinned > 0 {
            warn!(
                "buffer pool exhausted: {} of {} resident pages are clean but pinned",
                pinned,
                self.len()
            );
            Some(StorageError::PagesPinned { capacity, pinned })
        } else {
            warn!("buffer pool exhausted: no clean page among {} resident", self.len());
            Some(StorageError::PoolExhausted { capacity })
        }
    }
}
