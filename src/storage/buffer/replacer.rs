use crate::storage::PageId;
use std::fmt::Debug;

/// Chooses which resident page to evict.
pub trait Replacer: Send + Sync + Debug {
    /// Note that a page was just loaded or accessed.
    fn record_access(&mut self, page_id: PageId);

    /// Stop tracking a page that left the cache.
    fn remove(&mut self, page_id: PageId);

    /// Pick and stop tracking a page for which `evictable` returns true.
    /// Returns None if no tracked page qualifies.
    fn victim(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId>;

    /// Get the number of tracked pages.
    fn size(&self) -> usize;
}
