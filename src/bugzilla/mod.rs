//! Bugzilla REST backend: client, wire types, live fetch and cache replay.

mod api_types;
mod client;
mod connector;
mod error;
mod item;
mod replay;
mod types;

#[cfg(test)]
pub mod testing;

pub use client::{BugzillaClient, HttpTransport, Transport};
pub use connector::{BugzillaRest, Bugs, MAX_BUGS};
pub use error::{BackendError, ClientError, TransportError};
pub use item::{id_of, updated_on_of, Item};
pub use replay::CachedBugs;
pub use types::{Attachment, Bug, BugId, Comment, FieldChange, HistoryEvent};
