//! Page lock manager.
//!
//! Lock state is partitioned into stripes by page id. A stripe owns both
//! views of its pages: page -> (mode, holders) and transaction -> pages.
//! Every grant and release updates both under the stripe mutex, so the two
//! can never disagree. Waiters sleep on the stripe's condition variable and
//! are woken whenever a lock in that stripe is released.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Access modes a transaction may request on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permissions {
    /// Read access; any number of shared holders may coexist.
    Shared,
    /// Write access; excludes every other transaction.
    Exclusive,
}

impl Permissions {
    pub fn is_compatible_with(&self, other: &Permissions) -> bool {
        matches!((self, other), (Permissions::Shared, Permissions::Shared))
    }
}

#[derive(Debug)]
struct LockEntry {
    mode: Permissions,
    holders: HashSet<TransactionId>,
}

#[derive(Debug, Default)]
struct LockTable {
    entries: HashMap<PageId, LockEntry>,
    holdings: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn try_grant(&mut self, page_id: PageId, txn: TransactionId, mode: Permissions) -> bool {
        let granted_mode = match self.entries.get(&page_id) {
            None => mode,
            Some(entry) if entry.holders.len() == 1 && entry.holders.contains(&txn) => {
                // Exclusive subsumes Shared; a sole holder never downgrades itself.
                if entry.mode == Permissions::Exclusive {
                    Permissions::Exclusive
                } else {
                    mode
                }
            }
            Some(entry) if entry.mode.is_compatible_with(&mode) => mode,
            Some(_) => return false,
        };

        let entry = self.entries.entry(page_id).or_insert_with(|| LockEntry {
            mode: granted_mode,
            holders: HashSet::new(),
        });
        entry.mode = granted_mode;
        entry.holders.insert(txn);
        self.holdings.entry(txn).or_default().insert(page_id);
        true
    }

    fn release(&mut self, page_id: PageId, txn: TransactionId) -> bool {
        let Some(entry) = self.entries.get_mut(&page_id) else {
            return false;
        };
        if !entry.holders.remove(&txn) {
            return false;
        }
        if entry.holders.is_empty() {
            self.entries.remove(&page_id);
        }

        if let Some(pages) = self.holdings.get_mut(&txn) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.holdings.remove(&txn);
            }
        }
        true
    }

    fn release_all(&mut self, txn: TransactionId) -> Vec<PageId> {
        let pages: Vec<PageId> = self
            .holdings
            .remove(&txn)
            .map(|pages| pages.into_iter().collect())
            .unwrap_or_default();

        for page_id in &pages {
            if let Some(entry) = self.entries.get_mut(page_id) {
                entry.holders.remove(&txn);
                if entry.holders.is_empty() {
                    self.entries.remove(page_id);
                }
            }
        }
        pages
    }
}

#[derive(Debug, Default)]
struct Stripe {
    table: Mutex<LockTable>,
    released: Condvar,
}

/// Grants and tracks page locks for transactions.
#[derive(Debug)]
pub struct LockManager {
    stripes: Box<[Stripe]>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_stripes(crate::config::DEFAULT_LOCK_STRIPES)
    }

    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Stripe::default()).collect(),
        }
    }

    fn stripe(&self, page_id: &PageId) -> &Stripe {
        let mut hasher = DefaultHasher::new();
        page_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() % self.stripes.len() as u64) as usize]
    }

    /// Grants the lock if it is compatible with the page's current state. Never blocks.
    ///
    /// A request is granted when the page is unlocked, when both the held and
    /// requested modes are shared, or when the requester is the page's only
    /// holder (re-entry and upgrade).
    pub fn try_acquire(&self, page_id: PageId, txn: TransactionId, mode: Permissions) -> bool {
        self.stripe(&page_id).table.lock().try_grant(page_id, txn, mode)
    }

    /// Waits up to `timeout` for the lock, retrying each time a lock in the
    /// same stripe is released.
    pub fn acquire(
        &self,
        page_id: PageId,
        txn: TransactionId,
        mode: Permissions,
        timeout: Duration,
    ) -> StorageResult<()> {
        let deadline = Instant::now() + timeout;
        let stripe = self.stripe(&page_id);
        let mut table = stripe.table.lock();

        loop {
            if table.try_grant(page_id, txn, mode) {
                debug!("{} granted {:?} on page {}", txn, mode, page_id);
                return Ok(());
            }

            if stripe.released.wait_until(&mut table, deadline).timed_out() {
                if table.try_grant(page_id, txn, mode) {
                    debug!("{} granted {:?} on page {}", txn, mode, page_id);
                    return Ok(());
                }
                warn!(
                    "{} gave up on {:?} lock for page {} after {:?}",
                    txn, mode, page_id, timeout
                );
                return Err(StorageError::LockTimeout { txn, page: page_id });
            }
        }
    }

    /// Drops `txn`'s lock on `page_id`. Does nothing if it holds none.
    pub fn release(&self, page_id: PageId, txn: TransactionId) {
        let stripe = self.stripe(&page_id);
        let released = stripe.table.lock().release(page_id, txn);
        if released {
            stripe.released.notify_all();
        }
    }

    /// Drops every lock `txn` holds and returns the pages that were released.
    pub fn release_all(&self, txn: TransactionId) -> Vec<PageId> {
        let mut released = Vec::new();
        for stripe in self.stripes.iter() {
            let pages = stripe.table.lock().release_all(txn);
            if !pages.is_empty() {
                stripe.released.notify_all();
                released.extend(pages);
            }
        }
        released
    }

    pub fn is_held(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.stripe(&page_id)
            .table
            .lock()
            .entries
            .get(&page_id)
            .is_some_and(|entry| entry.holders.contains(&txn))
    }

    pub fn held_pages(&self, txn: TransactionId) -> HashSet<PageId> {
        let mut pages = HashSet::new();
        for stripe in self.stripes.iter() {
            if let Some(held) = stripe.table.lock().holdings.get(&txn) {
                pages.extend(held.iter().copied());
            }
        }
        pages
    }

    /// Current mode on the page, or `None` if it is unlocked.
    pub fn lock_mode(&self, page_id: PageId) -> Option<Permissions> {
        self.stripe(&page_id)
            .table
            .lock()
            .entries
            .get(&page_id)
            .map(|entry| entry.mode)
    }

    pub fn holders(&self, page_id: PageId) -> Vec<TransactionId> {
        let mut holders: Vec<_> = self
            .stripe(&page_id)
            .table
            .lock()
            .entries
            .get(&page_id)
            .map(|entry| entry.holders.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
