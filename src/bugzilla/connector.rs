//! Live fetch over the Bugzilla REST API.
//!
//! Every raw response is pushed to the cache log in the exact order it was
//! received: one bug page, then comments, history and attachments for each
//! bug of that page. The page is flushed once all of its bugs are done, so
//! the log only ever holds whole pages.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::cache::CacheLog;

use super::api_types;
use super::client::{BugzillaClient, Transport};
use super::error::BackendError;
use super::item::Item;
use super::replay::CachedBugs;
use super::types::{Bug, BugShell};

/// Default number of bugs requested per page
pub const MAX_BUGS: i64 = 500;

/// Bugzilla REST backend.
///
/// Owns the client and, optionally, the cache log the raw responses are
/// written to and replayed from.
pub struct BugzillaRest<T: Transport, C: CacheLog> {
  url: String,
  origin: String,
  max_bugs: usize,
  client: BugzillaClient<T>,
  cache: Option<C>,
}

impl<T: Transport, C: CacheLog> BugzillaRest<T, C> {
  pub fn new(url: &str, client: BugzillaClient<T>, cache: Option<C>) -> Self {
    Self {
      url: url.to_string(),
      origin: url.to_string(),
      max_bugs: MAX_BUGS as usize,
      client,
      cache,
    }
  }

  /// Set the page size. Anything below 1 is treated as 1.
  pub fn with_max_bugs(mut self, max_bugs: i64) -> Self {
    self.max_bugs = usize::try_from(max_bugs.max(1)).unwrap_or(usize::MAX);
    self
  }

  /// Set the origin reported in items. Empty means the server URL.
  pub fn with_origin(mut self, origin: Option<&str>) -> Self {
    self.origin = match origin {
      Some(o) if !o.is_empty() => o.to_string(),
      _ => self.url.clone(),
    };
    self
  }

  pub fn max_bugs(&self) -> usize {
    self.max_bugs
  }

  pub fn origin(&self) -> &str {
    &self.origin
  }

  pub fn client(&self) -> &BugzillaClient<T> {
    &self.client
  }

  pub fn cache(&self) -> Option<&C> {
    self.cache.as_ref()
  }

  pub fn cache_mut(&mut self) -> Option<&mut C> {
    self.cache.as_mut()
  }

  /// Fetch bugs changed at or after `from_date` (the epoch when `None`).
  ///
  /// Entries left unflushed by an earlier run are purged first.
  pub fn fetch(&mut self, from_date: Option<DateTime<Utc>>) -> Bugs<'_, T, C> {
    let from_date = from_date.unwrap_or(DateTime::UNIX_EPOCH);
    info!(url = %self.url, from_date = %from_date, "Looking for bugs");

    if let Some(cache) = self.cache.as_mut() {
      cache.purge();
    }

    Bugs {
      backend: self,
      from_date,
      offset: 0,
      shells: VecDeque::new(),
      page_open: false,
      finished: false,
      fetched: 0,
    }
  }

  /// Rebuild the bugs of earlier fetches from the cache log alone.
  pub fn fetch_from_cache(&self) -> Result<CachedBugs<'_>, BackendError> {
    let cache = self.cache.as_ref().ok_or(BackendError::CacheUnavailable)?;
    info!(url = %self.url, "Retrieving cached bugs");
    Ok(CachedBugs::new(cache.retrieve()?, &self.origin))
  }

  fn push_cache(&mut self, raw: &str) {
    if let Some(cache) = self.cache.as_mut() {
      cache.push(raw);
    }
  }

  fn flush_cache(&mut self) -> Result<(), BackendError> {
    if let Some(cache) = self.cache.as_mut() {
      cache.flush()?;
    }
    Ok(())
  }

  fn fetch_page(
    &mut self,
    from_date: DateTime<Utc>,
    offset: usize,
  ) -> Result<Vec<BugShell>, BackendError> {
    debug!(
      from_date = %from_date,
      offset,
      limit = self.max_bugs,
      "Fetching and parsing bugs"
    );

    let raw = self.client.bugs(from_date, offset, self.max_bugs)?;
    self.push_cache(&raw);
    api_types::parse_page(&raw)
  }

  fn fetch_bug(&mut self, shell: BugShell) -> Result<Bug, BackendError> {
    let id = shell.id.clone();

    debug!(bug = %id, "Fetching and parsing comments");
    let raw = self.client.comments(&id)?;
    self.push_cache(&raw);
    let comments = api_types::parse_comments(&raw, &id)?;

    debug!(bug = %id, "Fetching and parsing history");
    let raw = self.client.history(&id)?;
    self.push_cache(&raw);
    let history = api_types::parse_history(&raw, &id)?;

    debug!(bug = %id, "Fetching and parsing attachments");
    let raw = self.client.attachments(&id)?;
    self.push_cache(&raw);
    let attachments = api_types::parse_attachments(&raw, &id)?;

    Ok(shell.into_bug(comments, history, attachments))
  }
}

/// Lazy sequence of bugs from a live fetch.
///
/// Yields each bug as soon as its sub-resources are in. Stops after the
/// first empty page, or after yielding the first error.
pub struct Bugs<'a, T: Transport, C: CacheLog> {
  backend: &'a mut BugzillaRest<T, C>,
  from_date: DateTime<Utc>,
  offset: usize,
  shells: VecDeque<BugShell>,
  /// A page has been pushed to the cache but not flushed yet
  page_open: bool,
  finished: bool,
  fetched: usize,
}

impl<T: Transport, C: CacheLog> Bugs<'_, T, C> {
  fn advance(&mut self) -> Result<Option<Item>, BackendError> {
    loop {
      if let Some(shell) = self.shells.pop_front() {
        let bug = self.backend.fetch_bug(shell)?;
        return Item::new(&self.backend.origin, bug).map(Some);
      }

      if self.page_open {
        self.backend.flush_cache()?;
        self.page_open = false;
        self.offset += self.backend.max_bugs;
      }

      let shells = self.backend.fetch_page(self.from_date, self.offset)?;
      if shells.is_empty() {
        // The empty page is committed too, marking a complete harvest
        self.backend.flush_cache()?;
        return Ok(None);
      }

      self.shells = shells.into();
      self.page_open = true;
    }
  }
}

impl<T: Transport, C: CacheLog> Iterator for Bugs<'_, T, C> {
  type Item = Result<Item, BackendError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.advance() {
      Ok(Some(item)) => {
        self.fetched += 1;
        Some(Ok(item))
      }
      Ok(None) => {
        self.finished = true;
        info!(bugs = self.fetched, "Fetch process completed");
        None
      }
      Err(e) => {
        self.finished = true;
        warn!(error = %e, bugs = self.fetched, "Fetch process aborted");
        Some(Err(e))
      }
    }
  }
}
