//! Incremental Bugzilla REST harvester with an offline replay cache.
//!
//! Bugs are fetched page by page together with their comments, history and
//! attachments. Every raw response is appended to a cache log so the same
//! bugs can later be rebuilt without contacting the server.

pub mod bugzilla;
pub mod cache;
pub mod config;
pub mod dates;
pub mod harvest;
