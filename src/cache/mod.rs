//! Append-only cache log for raw backend responses.
//!
//! This module provides the durable side of the fetch/replay pipeline:
//! - Raw response bodies are buffered in memory as they arrive
//! - A flush commits every buffered entry in one transaction
//! - Committed entries are read back lazily, in the order they were written
//! - Whole-log backup and recovery for runs that fail mid-way
//!
//! Entries carry no metadata. Their meaning comes from their position alone.

mod storage;
mod traits;

pub use storage::SqliteCacheLog;
pub use traits::{CacheError, CacheLog, Entries};
