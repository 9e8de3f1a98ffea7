//! Transaction identity and lifecycle handles.
//!
//! Transactions are identified by a [`TransactionId`] handed out by a
//! [`TransactionIdGenerator`]. A [`Transaction`] handle ties an id to a
//! buffer pool and guarantees the transaction is completed exactly once:
//! explicitly through `commit`/`abort`, or by rollback when dropped.

pub mod handle;
pub mod id;

pub use handle::Transaction;
pub use id::{TransactionId, TransactionIdGenerator};
