//! Offline replay of a cache log.
//!
//! The log has no record boundaries. An entry is a bug page, and every bug
//! in that page is followed by exactly three entries: comments, history and
//! attachments. Replay walks the log with that shape in mind and feeds each
//! entry to the same decoders the live fetch uses.
//!
//! Whatever can be checked is checked: a log that ends in the middle of a
//! page, a comments or attachments response without the expected bug, or a
//! history record naming another bug all stop the replay with an error. A
//! well-formed entry that belongs to a different bug but does not say so
//! cannot be detected.

use std::collections::VecDeque;
use tracing::{info, warn};

use crate::cache::Entries;

use super::api_types;
use super::error::BackendError;
use super::item::Item;
use super::types::{BugId, BugShell};

/// Lazy sequence of bugs rebuilt from committed cache entries.
pub struct CachedBugs<'a> {
  entries: Entries<'a>,
  origin: &'a str,
  shells: VecDeque<BugShell>,
  finished: bool,
  retrieved: usize,
}

impl<'a> CachedBugs<'a> {
  pub fn new(entries: Entries<'a>, origin: &'a str) -> Self {
    Self {
      entries,
      origin,
      shells: VecDeque::new(),
      finished: false,
      retrieved: 0,
    }
  }

  fn advance(&mut self) -> Result<Option<Item>, BackendError> {
    loop {
      if let Some(shell) = self.shells.pop_front() {
        let id = shell.id.clone();
        let comments = api_types::parse_comments(&self.next_entry(&id, "comments")?, &id)?;
        let history = api_types::parse_history(&self.next_entry(&id, "history")?, &id)?;
        let attachments =
          api_types::parse_attachments(&self.next_entry(&id, "attachments")?, &id)?;

        let bug = shell.into_bug(comments, history, attachments);
        return Item::new(self.origin, bug).map(Some);
      }

      match self.entries.next() {
        None => return Ok(None),
        Some(raw) => self.shells = api_types::parse_page(&raw?)?.into(),
      }
    }
  }

  fn next_entry(&mut self, bug_id: &BugId, what: &'static str) -> Result<String, BackendError> {
    match self.entries.next() {
      Some(raw) => Ok(raw?),
      None => Err(BackendError::Truncated {
        what,
        bug_id: bug_id.to_string(),
      }),
    }
  }
}

impl Iterator for CachedBugs<'_> {
  type Item = Result<Item, BackendError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.advance() {
      Ok(Some(item)) => {
        self.retrieved += 1;
        Some(Ok(item))
      }
      Ok(None) => {
        self.finished = true;
        info!(
          bugs = self.retrieved,
          "Retrieval process completed: bugs retrieved from cache"
        );
        None
      }
      Err(e) => {
        self.finished = true;
        warn!(error = %e, bugs = self.retrieved, "Cache replay aborted");
        Some(Err(e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::bugzilla::error::BackendError;
  use crate::bugzilla::item::Item;
  use crate::bugzilla::testing::{self, FakeTransport};
  use crate::bugzilla::BugzillaRest;
  use crate::cache::{CacheLog, SqliteCacheLog};

  type TestBackend = BugzillaRest<FakeTransport, SqliteCacheLog>;

  /// Backend with no routes at all: any network call fails.
  fn offline(entries: &[String]) -> TestBackend {
    let mut cache = SqliteCacheLog::open_in_memory().unwrap();
    for entry in entries {
      cache.push(entry);
    }
    cache.flush().unwrap();
    BugzillaRest::new(testing::BASE_URL, testing::client(FakeTransport::new()), Some(cache))
  }

  fn triplet(id: u64) -> Vec<String> {
    vec![
      testing::comments_body(id),
      testing::history_body(id),
      testing::attachments_body(id),
    ]
  }

  #[test]
  fn test_replay_matches_live_fetch() {
    let pages: &[&[u64]] = &[&[10, 11], &[12]];
    let cache = SqliteCacheLog::open_in_memory().unwrap();
    let client = testing::client(FakeTransport::scripted(pages, 2));
    let mut backend = BugzillaRest::new(testing::BASE_URL, client, Some(cache)).with_max_bugs(2);

    let live: Vec<Item> = backend.fetch(None).collect::<Result<_, _>>().unwrap();
    let calls_after_fetch = backend.client().transport().calls().len();

    let replayed: Vec<Item> = backend
      .fetch_from_cache()
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();

    assert_eq!(replayed.len(), 3);
    for (a, b) in live.iter().zip(&replayed) {
      assert_eq!(a.data, b.data);
      assert_eq!(a.uuid, b.uuid);
      assert_eq!(a.updated_on, b.updated_on);
    }
    assert_eq!(backend.client().transport().calls().len(), calls_after_fetch);
  }

  #[test]
  fn test_replay_two_bug_page() {
    let mut entries = vec![testing::page_body(&[10, 11])];
    entries.extend(triplet(10));
    entries.extend(triplet(11));
    let backend = offline(&entries);

    let items: Vec<Item> = backend
      .fetch_from_cache()
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].data.id.to_string(), "10");
    assert_eq!(items[1].data.id.to_string(), "11");
    for item in &items {
      assert!(!item.data.comments.is_empty());
      assert!(!item.data.history.is_empty());
      assert!(!item.data.attachments.is_empty());
    }
    assert_eq!(items[1].data.comments[0].text, "comment on bug 11");
    assert!(backend.client().transport().calls().is_empty());
  }

  #[test]
  fn test_replay_skips_empty_pages() {
    let mut entries = vec![testing::page_body(&[1])];
    entries.extend(triplet(1));
    entries.push(testing::page_body(&[]));
    let backend = offline(&entries);

    assert_eq!(backend.fetch_from_cache().unwrap().count(), 1);
  }

  #[test]
  fn test_replay_empty_log() {
    let backend = offline(&[]);
    assert_eq!(backend.fetch_from_cache().unwrap().count(), 0);
  }

  #[test]
  fn test_replay_truncated_log() {
    let mut entries = vec![testing::page_body(&[10, 11])];
    entries.extend(triplet(10));
    entries.push(testing::comments_body(11));
    let backend = offline(&entries);

    let mut bugs = backend.fetch_from_cache().unwrap();
    assert!(bugs.next().unwrap().is_ok());
    let err = bugs.next().unwrap().unwrap_err();
    assert!(matches!(
      err,
      BackendError::Truncated { what: "history", ref bug_id } if bug_id == "11"
    ));
    assert!(bugs.next().is_none());
  }

  #[test]
  fn test_replay_detects_swapped_bugs() {
    // Bug 11's triplet sits where bug 10's should be
    let mut entries = vec![testing::page_body(&[10, 11])];
    entries.extend(triplet(11));
    entries.extend(triplet(10));
    let backend = offline(&entries);

    let err = backend.fetch_from_cache().unwrap().next().unwrap().unwrap_err();
    assert!(matches!(err, BackendError::MissingBug { what: "comments", .. }));
  }

  #[test]
  fn test_replay_detects_misaligned_history() {
    let entries = vec![
      testing::page_body(&[10]),
      testing::comments_body(10),
      testing::history_body(99),
      testing::attachments_body(10),
    ];
    let backend = offline(&entries);

    let err = backend.fetch_from_cache().unwrap().next().unwrap().unwrap_err();
    assert!(matches!(err, BackendError::Misaligned { .. }));
  }

  #[test]
  fn test_replay_corrupt_entry() {
    let entries = vec![testing::page_body(&[10]), "not json".to_string()];
    let backend = offline(&entries);

    let err = backend.fetch_from_cache().unwrap().next().unwrap().unwrap_err();
    assert!(matches!(err, BackendError::Decode { what: "comments", .. }));
  }
}
