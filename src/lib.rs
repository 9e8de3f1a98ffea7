pub mod concurrency;
pub mod config;
pub mod storage;
pub mod transaction;
