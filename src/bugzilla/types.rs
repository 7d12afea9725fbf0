use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Bug identifier. Bugzilla sends numbers, but aliases and some proxies send strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BugId {
  Number(u64),
  Text(String),
}

impl fmt::Display for BugId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BugId::Number(n) => write!(f, "{}", n),
      BugId::Text(s) => f.write_str(s),
    }
  }
}

/// A bug as listed in a page, before its comments, history and attachments are attached
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BugShell {
  pub id: BugId,
  pub last_change_time: String,
  /// Every other field the server returned, kept verbatim
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl BugShell {
  /// Attach the sub-resources and produce the finished record.
  pub fn into_bug(
    mut self,
    comments: Vec<Comment>,
    history: Vec<HistoryEvent>,
    attachments: Vec<Attachment>,
  ) -> Bug {
    for key in ["comments", "history", "attachments"] {
      self.fields.remove(key);
    }
    Bug {
      id: self.id,
      last_change_time: self.last_change_time,
      fields: self.fields,
      comments,
      history,
      attachments,
    }
  }
}

/// Fully assembled bug
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bug {
  pub id: BugId,
  pub last_change_time: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
  pub comments: Vec<Comment>,
  pub history: Vec<HistoryEvent>,
  pub attachments: Vec<Attachment>,
}

/// Comment on a bug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
  pub id: u64,
  pub text: String,
  pub creator: String,
  pub creation_time: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One entry of a bug's change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
  pub when: String,
  pub who: String,
  pub changes: Vec<FieldChange>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A single field change inside a history event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
  pub field_name: String,
  pub removed: String,
  pub added: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Attachment metadata (the binary payload is excluded by the query)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
  pub id: u64,
  pub file_name: String,
  pub creation_time: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}
