//! SQLite implementation of the cache log.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::traits::{CacheError, CacheLog, Entries};

/// Rows fetched per query while iterating committed entries.
const RETRIEVE_CHUNK: i64 = 64;

/// SQLite-backed cache log.
///
/// Committed entries live in `cache_entries`, keyed by their position in the
/// stream. Buffered entries stay in memory until [`CacheLog::flush`].
pub struct SqliteCacheLog {
  conn: Connection,
  pending: Vec<String>,
}

impl SqliteCacheLog {
  /// Open (or create) a cache log at the given path.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "Opened cache log");
    Self::with_connection(conn)
  }

  /// Open a cache log that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, CacheError> {
    let log = Self {
      conn,
      pending: Vec::new(),
    };
    log.run_migrations()?;
    Ok(log)
  }

  /// Default base directory for cache files.
  pub fn default_dir() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("bzharvest").join("cache"))
  }

  /// Cache file for a server URL under `base`.
  ///
  /// The URL is hashed so every server gets its own file with a stable,
  /// filesystem-safe name.
  pub fn path_for(base: &Path, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.trim_end_matches('/').as_bytes());
    base.join(format!("{}.db", hex::encode(hasher.finalize())))
  }

  /// Number of committed entries.
  #[cfg(test)]
  fn committed_len(&self) -> Result<usize, CacheError> {
    let count: i64 = self
      .conn
      .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
  }

  fn run_migrations(&self) -> Result<(), CacheError> {
    self.conn.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn has_backup(&self) -> Result<bool, CacheError> {
    let found = self
      .conn
      .query_row(
        "SELECT value FROM cache_meta WHERE key = 'backup_at'",
        [],
        |row| row.get::<_, String>(0),
      )
      .optional()?;
    Ok(found.is_some())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Committed entries, in stream order
CREATE TABLE IF NOT EXISTS cache_entries (
    position INTEGER PRIMARY KEY,
    data TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Snapshot of cache_entries taken by backup()
CREATE TABLE IF NOT EXISTS cache_entries_backup (
    position INTEGER PRIMARY KEY,
    data TEXT NOT NULL,
    cached_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cache_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl CacheLog for SqliteCacheLog {
  fn push(&mut self, entry: &str) {
    self.pending.push(entry.to_owned());
  }

  fn flush(&mut self) -> Result<(), CacheError> {
    if self.pending.is_empty() {
      return Ok(());
    }

    let tx = self.conn.transaction()?;
    {
      let next: i64 = tx.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM cache_entries",
        [],
        |row| row.get(0),
      )?;
      let mut stmt = tx.prepare("INSERT INTO cache_entries (position, data) VALUES (?, ?)")?;
      for (position, entry) in (next..).zip(&self.pending) {
        stmt.execute(params![position, entry])?;
      }
    }
    tx.commit()?;

    debug!(entries = self.pending.len(), "Flushed cache queue");
    self.pending.clear();
    Ok(())
  }

  fn purge(&mut self) {
    if !self.pending.is_empty() {
      debug!(entries = self.pending.len(), "Purged uncommitted cache entries");
    }
    self.pending.clear();
  }

  fn pending_len(&self) -> usize {
    self.pending.len()
  }

  fn retrieve(&self) -> Result<Entries<'_>, CacheError> {
    Ok(Box::new(CommittedEntries {
      conn: &self.conn,
      next_position: 0,
      chunk: VecDeque::new(),
      exhausted: false,
    }))
  }

  fn backup(&mut self) -> Result<(), CacheError> {
    let tx = self.conn.transaction()?;
    tx.execute("DELETE FROM cache_entries_backup", [])?;
    let copied = tx.execute(
      "INSERT INTO cache_entries_backup (position, data, cached_at)
       SELECT position, data, cached_at FROM cache_entries",
      [],
    )?;
    tx.execute(
      "INSERT OR REPLACE INTO cache_meta (key, value) VALUES ('backup_at', datetime('now'))",
      [],
    )?;
    tx.commit()?;

    debug!(entries = copied, "Backed up cache log");
    Ok(())
  }

  fn recover(&mut self) -> Result<(), CacheError> {
    if !self.has_backup()? {
      return Err(CacheError::NoBackup);
    }

    self.pending.clear();
    let tx = self.conn.transaction()?;
    tx.execute("DELETE FROM cache_entries", [])?;
    let restored = tx.execute(
      "INSERT INTO cache_entries (position, data, cached_at)
       SELECT position, data, cached_at FROM cache_entries_backup",
      [],
    )?;
    tx.commit()?;

    info!(entries = restored, "Recovered cache log from backup");
    Ok(())
  }

  fn clean(&mut self) -> Result<(), CacheError> {
    self.pending.clear();
    let tx = self.conn.transaction()?;
    tx.execute("DELETE FROM cache_entries", [])?;
    tx.execute("DELETE FROM cache_entries_backup", [])?;
    tx.execute("DELETE FROM cache_meta", [])?;
    tx.commit()?;

    info!("Cleaned cache log");
    Ok(())
  }
}

/// Lazy reader over `cache_entries`, loading a chunk of rows at a time.
struct CommittedEntries<'a> {
  conn: &'a Connection,
  next_position: i64,
  chunk: VecDeque<(i64, String)>,
  exhausted: bool,
}

impl CommittedEntries<'_> {
  fn load_chunk(&mut self) -> Result<(), CacheError> {
    let conn = self.conn;
    let mut stmt = conn.prepare_cached(
      "SELECT position, data FROM cache_entries
       WHERE position >= ?
       ORDER BY position
       LIMIT ?",
    )?;

    let rows = stmt.query_map(params![self.next_position, RETRIEVE_CHUNK], |row| {
      Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
      self.chunk.push_back(row?);
    }

    if self.chunk.len() < RETRIEVE_CHUNK as usize {
      self.exhausted = true;
    }
    Ok(())
  }
}

impl Iterator for CommittedEntries<'_> {
  type Item = Result<String, CacheError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.chunk.is_empty() && !self.exhausted {
      if let Err(e) = self.load_chunk() {
        self.exhausted = true;
        return Some(Err(e));
      }
    }

    let (position, data) = self.chunk.pop_front()?;
    self.next_position = position + 1;
    Some(Ok(data))
  }
}
