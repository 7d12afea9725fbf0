//! Serde-deserializable types matching Bugzilla REST responses.
//!
//! These envelopes only exist to validate a raw body at the boundary and pull
//! out the part that belongs to one bug. The same decoders serve the live
//! fetch and the cache replay, so both produce identical records.

use serde::Deserialize;
use std::collections::HashMap;

use super::error::BackendError;
use super::types::{Attachment, BugId, BugShell, Comment, HistoryEvent};

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiBugPage {
  pub bugs: Vec<BugShell>,
}

#[derive(Debug, Deserialize)]
pub struct ApiBugComments {
  pub comments: Vec<Comment>,
}

/// `{ "bugs": { "<id>": { "comments": [...] } } }`
#[derive(Debug, Deserialize)]
pub struct ApiCommentsResponse {
  pub bugs: HashMap<String, ApiBugComments>,
}

#[derive(Debug, Deserialize)]
pub struct ApiBugHistory {
  pub id: Option<BugId>,
  pub history: Vec<HistoryEvent>,
}

/// `{ "bugs": [ { "history": [...] } ] }`
#[derive(Debug, Deserialize)]
pub struct ApiHistoryResponse {
  pub bugs: Vec<ApiBugHistory>,
}

/// `{ "bugs": { "<id>": [...] } }`
#[derive(Debug, Deserialize)]
pub struct ApiAttachmentsResponse {
  pub bugs: HashMap<String, Vec<Attachment>>,
}

#[derive(Debug, Deserialize)]
pub struct ApiLoginResponse {
  pub token: String,
}

// ============================================================================
// Decoders
// ============================================================================

fn decode<'a, T: Deserialize<'a>>(raw: &'a str, what: &'static str) -> Result<T, BackendError> {
  serde_json::from_str(raw).map_err(|source| BackendError::Decode { what, source })
}

/// Decode a bug list page into its bug shells, in server order.
pub fn parse_page(raw: &str) -> Result<Vec<BugShell>, BackendError> {
  let page: ApiBugPage = decode(raw, "bug page")?;
  Ok(page.bugs)
}

/// Decode a comments response and take the comments of `bug_id`.
pub fn parse_comments(raw: &str, bug_id: &BugId) -> Result<Vec<Comment>, BackendError> {
  let mut response: ApiCommentsResponse = decode(raw, "comments")?;
  response
    .bugs
    .remove(&bug_id.to_string())
    .map(|entry| entry.comments)
    .ok_or_else(|| BackendError::MissingBug {
      what: "comments",
      bug_id: bug_id.to_string(),
    })
}

/// Decode a history response and take its first record.
///
/// The record is matched by position. When the server includes the bug id
/// in the record it must agree with `bug_id`.
pub fn parse_history(raw: &str, bug_id: &BugId) -> Result<Vec<HistoryEvent>, BackendError> {
  let response: ApiHistoryResponse = decode(raw, "history")?;
  let record = response
    .bugs
    .into_iter()
    .next()
    .ok_or_else(|| BackendError::MissingBug {
      what: "history",
      bug_id: bug_id.to_string(),
    })?;

  if let Some(found) = record.id {
    if found.to_string() != bug_id.to_string() {
      return Err(BackendError::Misaligned {
        expected: bug_id.to_string(),
        found: found.to_string(),
      });
    }
  }

  Ok(record.history)
}

/// Decode an attachments response and take the attachments of `bug_id`.
pub fn parse_attachments(raw: &str, bug_id: &BugId) -> Result<Vec<Attachment>, BackendError> {
  let mut response: ApiAttachmentsResponse = decode(raw, "attachments")?;
  response
    .bugs
    .remove(&bug_id.to_string())
    .ok_or_else(|| BackendError::MissingBug {
      what: "attachments",
      bug_id: bug_id.to_string(),
    })
}
