//! Canned Bugzilla responses and a scripted transport for tests.

use serde_json::json;
use std::cell::RefCell;
use std::collections::HashMap;
use url::Url;

use super::client::{BugzillaClient, Transport};
use super::error::TransportError;

pub const BASE_URL: &str = "https://bugzilla.example.org";

/// Transport that serves fixed bodies by route and records every request.
///
/// A route is the URL path, plus `?offset=N` when the request carries an
/// offset, so successive bug pages can be told apart.
#[derive(Default)]
pub struct FakeTransport {
  routes: HashMap<String, Result<String, u16>>,
  calls: RefCell<Vec<Url>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, route: &str, body: impl Into<String>) -> Self {
    self.routes.insert(route.to_string(), Ok(body.into()));
    self
  }

  pub fn fail(mut self, route: &str, status: u16) -> Self {
    self.routes.insert(route.to_string(), Err(status));
    self
  }

  /// Serve `pages` as consecutive bug pages of `max_bugs`, each bug with its
  /// sub-resources, followed by an empty page.
  pub fn scripted(pages: &[&[u64]], max_bugs: usize) -> Self {
    let mut transport = Self::new();
    for (n, ids) in pages.iter().enumerate() {
      transport = transport.respond(&page_route(n * max_bugs), page_body(ids));
      for &id in ids.iter() {
        transport = transport.with_bug(id);
      }
    }
    transport.respond(&page_route(pages.len() * max_bugs), page_body(&[]))
  }

  pub fn with_bug(self, id: u64) -> Self {
    self
      .respond(&format!("/rest/bug/{id}/comment"), comments_body(id))
      .respond(&format!("/rest/bug/{id}/history"), history_body(id))
      .respond(&format!("/rest/bug/{id}/attachment"), attachments_body(id))
  }

  pub fn calls(&self) -> Vec<Url> {
    self.calls.borrow().clone()
  }

  pub fn routes_called(&self) -> Vec<String> {
    self.calls.borrow().iter().map(route_of).collect()
  }
}

impl Transport for FakeTransport {
  fn get(&self, url: &Url) -> Result<String, TransportError> {
    self.calls.borrow_mut().push(url.clone());
    match self.routes.get(&route_of(url)) {
      Some(Ok(body)) => Ok(body.clone()),
      Some(Err(status)) => Err(TransportError::Status {
        url: url.to_string(),
        status: *status,
      }),
      None => Err(TransportError::Status {
        url: url.to_string(),
        status: 404,
      }),
    }
  }
}

fn route_of(url: &Url) -> String {
  let mut route = url.path().to_string();
  if let Some((_, offset)) = url.query_pairs().find(|(k, _)| k == "offset") {
    route.push_str(&format!("?offset={offset}"));
  }
  route
}

pub fn page_route(offset: usize) -> String {
  if offset == 0 {
    "/rest/bug".to_string()
  } else {
    format!("/rest/bug?offset={offset}")
  }
}

pub fn client(transport: FakeTransport) -> BugzillaClient<FakeTransport> {
  BugzillaClient::new(BASE_URL, transport).unwrap()
}

pub fn page_body(ids: &[u64]) -> String {
  let bugs: Vec<_> = ids
    .iter()
    .map(|id| {
      json!({
        "id": id,
        "last_change_time": format!("2016-01-{:02}T10:00:00Z", id % 28 + 1),
        "summary": format!("Bug {id}"),
        "status": "NEW",
        "cc": ["dev@example.org"],
      })
    })
    .collect();
  json!({ "bugs": bugs, "faults": [] }).to_string()
}

pub fn comments_body(id: u64) -> String {
  json!({
    "bugs": {
      (id.to_string()): {
        "comments": [{
          "id": id * 100,
          "bug_id": id,
          "count": 0,
          "text": format!("comment on bug {id}"),
          "creator": "dev@example.org",
          "creation_time": "2016-01-01T09:00:00Z",
          "is_private": false,
        }]
      }
    },
    "comments": {}
  })
  .to_string()
}

pub fn history_body(id: u64) -> String {
  json!({
    "bugs": [{
      "id": id,
      "alias": [],
      "history": [{
        "when": "2016-01-01T09:30:00Z",
        "who": "triage@example.org",
        "changes": [{ "field_name": "status", "removed": "NEW", "added": "ASSIGNED" }]
      }]
    }]
  })
  .to_string()
}

pub fn attachments_body(id: u64) -> String {
  json!({
    "bugs": {
      (id.to_string()): [{
        "id": id * 10,
        "bug_id": id,
        "file_name": "patch.diff",
        "summary": "proposed fix",
        "content_type": "text/plain",
        "creation_time": "2016-01-01T09:45:00Z",
        "size": 42,
      }]
    },
    "attachments": {}
  })
  .to_string()
}
