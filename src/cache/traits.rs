//! Core trait and error type for the cache log.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a cache log backend.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("failed to create cache directory {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// `recover` was requested but `backup` never ran on this log.
  #[error("cache has no backup to recover from")]
  NoBackup,
}

/// Lazy sequence of committed entries, oldest first.
pub type Entries<'a> = Box<dyn Iterator<Item = Result<String, CacheError>> + 'a>;

/// An append-only log of raw text blobs.
///
/// Writers buffer entries with [`CacheLog::push`] and make them durable with
/// [`CacheLog::flush`]. Anything pushed but not flushed is invisible to
/// [`CacheLog::retrieve`] and is dropped by [`CacheLog::purge`].
pub trait CacheLog {
  /// Buffer an entry. Nothing is written until the next flush.
  fn push(&mut self, entry: &str);

  /// Commit every buffered entry, in push order, as one atomic unit.
  fn flush(&mut self) -> Result<(), CacheError>;

  /// Discard buffered entries that were never flushed.
  fn purge(&mut self);

  /// Number of buffered entries waiting for a flush.
  fn pending_len(&self) -> usize;

  /// Committed entries in the order they were written.
  fn retrieve(&self) -> Result<Entries<'_>, CacheError>;

  /// Snapshot the committed log so it can be restored with `recover`.
  fn backup(&mut self) -> Result<(), CacheError>;

  /// Restore the committed log to the last backup and drop buffered entries.
  fn recover(&mut self) -> Result<(), CacheError>;

  /// Remove every entry, committed or not, along with the backup.
  fn clean(&mut self) -> Result<(), CacheError>;
}
