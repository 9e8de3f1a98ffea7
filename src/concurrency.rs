//! Concurrency control module.
//!
//! Page-granularity shared/exclusive locking. Deadlocks are resolved by
//! bounded waits: a request that cannot be granted before its deadline
//! fails and the caller aborts the transaction.

pub mod lock;

pub use lock::{LockManager, Permissions};
