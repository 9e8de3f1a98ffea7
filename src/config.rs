//! Buffer pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of pages a buffer pool caches.
pub const DEFAULT_PAGES: usize = 50;

/// Default upper bound on how long `get_page` waits for a lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(300);

/// Default number of lock table stripes.
pub const DEFAULT_LOCK_STRIPES: usize = 16;

/// Tunables for a [`BufferPool`](crate::storage::BufferPool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Maximum number of resident pages.
    pub capacity: usize,
    /// How long a lock request may wait before the transaction is told to abort.
    pub lock_timeout: Duration,
    /// Number of independent lock table partitions.
    pub lock_stripes: usize,
}

impl BufferPoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_lock_stripes(mut self, lock_stripes: usize) -> Self {
        self.lock_stripes = lock_stripes.max(1);
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PAGES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.capacity, DEFAULT_PAGES);
        assert_eq!(config.lock_timeout, Duration::from_millis(300));
        assert_eq!(config.lock_stripes, DEFAULT_LOCK_STRIPES);
    }

    #[test]
    fn test_builder() {
        let config = BufferPoolConfig::default()
            .with_capacity(8)
            .with_lock_timeout(Duration::from_millis(20))
            .with_lock_stripes(0);

        assert_eq!(config.capacity, 8);
        assert_eq!(config.lock_timeout, Duration::from_millis(20));
        // At least one stripe is always kept
        assert_eq!(config.lock_stripes, 1);
    }
}
