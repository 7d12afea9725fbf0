//! Error types for the Bugzilla backend.

use thiserror::Error;

use crate::cache::CacheError;

/// Failure of a single GET request.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("request to {url} failed with HTTP status {status}")]
  Status { url: String, status: u16 },

  #[error("request to {url} failed: {source}")]
  Connection {
    url: String,
    #[source]
    source: reqwest::Error,
  },
}

/// Errors raised by [`super::BugzillaClient`].
#[derive(Debug, Error)]
pub enum ClientError {
  #[error("Bugzilla REST client could not authenticate user {user}: {cause}")]
  Auth { user: String, cause: String },

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("invalid resource URL {url}: {source}")]
  Url {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("failed to build HTTP client: {0}")]
  Build(#[source] reqwest::Error),

  #[error("unexpected login response: {0}")]
  LoginResponse(#[source] serde_json::Error),
}

/// Errors surfaced while fetching or replaying bugs.
#[derive(Debug, Error)]
pub enum BackendError {
  #[error(transparent)]
  Client(#[from] ClientError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("cache instance was not provided")]
  CacheUnavailable,

  #[error("failed to decode {what}: {source}")]
  Decode {
    what: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("{what} response has no entry for bug {bug_id}")]
  MissingBug { what: &'static str, bug_id: String },

  /// A history entry names a different bug than the one it is attached to.
  #[error("history of bug {found} cannot be attached to bug {expected}")]
  Misaligned { expected: String, found: String },

  /// The cache log ended in the middle of a page.
  #[error("cache log ended before the {what} entry of bug {bug_id}")]
  Truncated { what: &'static str, bug_id: String },

  #[error("invalid last_change_time {value:?}: {source}")]
  Timestamp {
    value: String,
    #[source]
    source: chrono::ParseError,
  },
}
