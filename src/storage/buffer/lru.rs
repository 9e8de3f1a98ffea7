use super::replacer::Replacer;
use crate::storage::PageId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Tracked pages, least recently used at front
    lru_list: VecDeque<PageId>,
    tracked: HashSet<PageId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
            tracked: HashSet::with_capacity(capacity),
        }
    }

    fn unlink(&mut self, page_id: PageId) {
        if let Some(idx) = self.lru_list.iter().position(|&id| id == page_id) {
            self.lru_list.remove(idx);
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        if !self.tracked.insert(page_id) {
            self.unlink(page_id);
        }
        self.lru_list.push_back(page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if self.tracked.remove(&page_id) {
            self.unlink(page_id);
        }
    }

    fn victim(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId> {
        let idx = self.lru_list.iter().position(|&id| evictable(id))?;
        let page_id = self.lru_list.remove(idx)?;
        self.tracked.remove(&page_id);
        Some(page_id)
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TableId;

    fn page(page_no: u32) -> PageId {
        PageId::new(TableId(1), page_no)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut replacer = LruReplacer::new(3);
        assert_eq!(replacer.victim(&|_| true), None);

        replacer.record_access(page(1));
        replacer.record_access(page(2));
        replacer.record_access(page(3));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(&|_| true), Some(page(1)));
        assert_eq!(replacer.victim(&|_| true), Some(page(2)));
        assert_eq!(replacer.victim(&|_| true), Some(page(3)));
        assert_eq!(replacer.victim(&|_| true), None);
    }

    #[test]
    fn test_access_moves_to_back() {
        let mut replacer = LruReplacer::new(3);
        replacer.record_access(page(1));
        replacer.record_access(page(2));
        replacer.record_access(page(1));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(&|_| true), Some(page(2)));
        assert_eq!(replacer.victim(&|_| true), Some(page(1)));
    }

    #[test]
    fn test_skips_unevictable() {
        let mut replacer = LruReplacer::new(3);
        replacer.record_access(page(1));
        replacer.record_access(page(2));
        replacer.record_access(page(3));

        // Page 1 is dirty, so page 2 is the oldest candidate
        assert_eq!(replacer.victim(&|id| id != page(1)), Some(page(2)));
        assert_eq!(replacer.victim(&|id| id == page(9)), None);
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_remove() {
        let mut replacer = LruReplacer::new(2);
        replacer.record_access(page(1));
        replacer.record_access(page(2));

        replacer.remove(page(1));
        replacer.remove(page(42));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(&|_| true), Some(page(2)));
    }
}
