//! Run a fetch or replay and stream the items out as JSON.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::io::{self, Write};
use tracing::warn;

use crate::bugzilla::{BackendError, BugzillaRest, Item, Transport};
use crate::cache::CacheLog;

/// Where items come from
#[derive(Debug, Clone, Copy)]
pub enum Mode {
  /// Fetch from the server, starting at the given date
  Fetch(Option<DateTime<Utc>>),
  /// Rebuild from the cache log
  Replay,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
  #[error(transparent)]
  Backend(#[from] BackendError),

  #[error("failed to write output: {0}")]
  Output(#[from] io::Error),
}

/// Stream items to `out`, one pretty-printed JSON object each.
///
/// A backend failure restores the cache from its backup before the error is
/// returned. A failure to write output does not touch the cache.
pub fn harvest<T: Transport, C: CacheLog>(
  backend: &mut BugzillaRest<T, C>,
  mode: Mode,
  out: &mut impl Write,
) -> Result<usize> {
  let written = match mode {
    Mode::Fetch(from_date) => write_items(backend.fetch(from_date), out),
    Mode::Replay => backend
      .fetch_from_cache()
      .map_err(RunError::from)
      .and_then(|items| write_items(items, out)),
  };

  match written {
    Ok(count) => Ok(count),
    Err(RunError::Output(e)) => Err(eyre!("Failed to write output: {}", e)),
    Err(RunError::Backend(e)) => {
      if let Some(cache) = backend.cache_mut() {
        if let Err(err) = cache.recover() {
          warn!(error = %err, "Could not recover cache");
        }
      }
      Err(e.into())
    }
  }
}

fn write_items<I>(items: I, out: &mut impl Write) -> std::result::Result<usize, RunError>
where
  I: Iterator<Item = std::result::Result<Item, BackendError>>,
{
  let mut count = 0;
  for item in items {
    write_item(&item?, out)?;
    count += 1;
  }
  out.flush()?;
  Ok(count)
}

fn write_item(item: &Item, out: &mut impl Write) -> io::Result<()> {
  // Going through Value sorts the keys
  let value = serde_json::to_value(item)?;
  let mut ser =
    serde_json::Serializer::with_formatter(&mut *out, PrettyFormatter::with_indent(b"    "));
  value.serialize(&mut ser)?;
  out.write_all(b"\n")
}
