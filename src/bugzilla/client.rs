use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api_types::ApiLoginResponse;
use super::error::{ClientError, TransportError};
use super::types::BugId;

/// Query parameters whose values never show up in logs or error messages
const SECRET_PARAMS: [&str; 2] = ["password", "token"];

/// Something that can perform a GET and hand back the body as text.
pub trait Transport {
  fn get(&self, url: &Url) -> Result<String, TransportError>;
}

/// Blocking HTTP transport
pub struct HttpTransport {
  client: reqwest::blocking::Client,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Result<Self, ClientError> {
    let client = reqwest::blocking::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("bzharvest/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(ClientError::Build)?;

    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  fn get(&self, url: &Url) -> Result<String, TransportError> {
    let response = self
      .client
      .get(url.clone())
      .send()
      .map_err(|source| TransportError::Connection {
        url: redacted(url),
        source,
      })?;

    let status = response.status();
    if !status.is_success() {
      return Err(TransportError::Status {
        url: redacted(url),
        status: status.as_u16(),
      });
    }

    response.text().map_err(|source| TransportError::Connection {
      url: redacted(url),
      source,
    })
  }
}

/// Bugzilla REST API client (Bugzilla 5.0 or later)
///
/// Every method returns the raw response body; decoding is left to the
/// caller so the exact text can be cached.
pub struct BugzillaClient<T = HttpTransport> {
  base_url: String,
  api_token: Option<String>,
  transport: T,
}

impl<T: Transport> BugzillaClient<T> {
  pub fn new(base_url: &str, transport: T) -> Result<Self, ClientError> {
    let base_url = base_url.trim_end_matches('/').to_string();
    Url::parse(&base_url).map_err(|source| ClientError::Url {
      url: base_url.clone(),
      source,
    })?;

    Ok(Self {
      base_url,
      api_token: None,
      transport,
    })
  }

  /// Use an API token for every request instead of logging in.
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.api_token = Some(token.into());
    self
  }

  pub fn api_token(&self) -> Option<&str> {
    self.api_token.as_deref()
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  /// Exchange credentials for a token used by later requests
  pub fn login(&mut self, user: &str, password: &str) -> Result<(), ClientError> {
    let params = [("login", user.to_string()), ("password", password.to_string())];

    let body = self.call("login", &params).map_err(|e| match e {
      ClientError::Transport(cause @ TransportError::Status { .. }) => ClientError::Auth {
        user: user.to_string(),
        cause: cause.to_string(),
      },
      other => other,
    })?;

    let response: ApiLoginResponse =
      serde_json::from_str(&body).map_err(ClientError::LoginResponse)?;
    self.api_token = Some(response.token);

    debug!(user, "Logged in to Bugzilla");
    Ok(())
  }

  /// Set up credentials: an API token wins, otherwise log in when both
  /// user and password are known. With neither the client stays anonymous.
  pub fn authenticate(
    mut self,
    token: Option<String>,
    user: Option<&str>,
    password: Option<&str>,
  ) -> Result<Self, ClientError> {
    if let Some(token) = token {
      return Ok(self.with_token(token));
    }
    if let (Some(user), Some(password)) = (user, password) {
      self.login(user, password)?;
    }
    Ok(self)
  }

  /// Get a page of bugs changed at or after `from_date`, oldest change first
  pub fn bugs(
    &self,
    from_date: DateTime<Utc>,
    offset: usize,
    max_bugs: usize,
  ) -> Result<String, ClientError> {
    let mut params = vec![
      (
        "last_change_time",
        from_date.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
      ),
      ("limit", max_bugs.to_string()),
      ("order", "changeddate".to_string()),
      ("include_fields", "_all".to_string()),
    ];
    if offset > 0 {
      params.push(("offset", offset.to_string()));
    }

    self.call("bug", &params)
  }

  pub fn comments(&self, bug_id: &BugId) -> Result<String, ClientError> {
    self.call(&format!("bug/{}/comment", bug_id), &[])
  }

  pub fn history(&self, bug_id: &BugId) -> Result<String, ClientError> {
    self.call(&format!("bug/{}/history", bug_id), &[])
  }

  /// Get attachment metadata of a bug, without the attached data itself
  pub fn attachments(&self, bug_id: &BugId) -> Result<String, ClientError> {
    self.call(
      &format!("bug/{}/attachment", bug_id),
      &[("exclude_fields", "data".to_string())],
    )
  }

  /// GET `<base>/rest/<resource>` and return the body.
  pub fn call(&self, resource: &str, params: &[(&str, String)]) -> Result<String, ClientError> {
    let raw = format!("{}/rest/{}", self.base_url, resource);
    let mut url = Url::parse(&raw).map_err(|source| ClientError::Url { url: raw, source })?;

    let token = self.api_token.as_deref().map(|t| ("token", t));
    let pairs: Vec<(&str, &str)> = params
      .iter()
      .map(|(k, v)| (*k, v.as_str()))
      .chain(token)
      .collect();
    if !pairs.is_empty() {
      url.query_pairs_mut().extend_pairs(&pairs);
    }

    debug!(resource, params = ?masked(&pairs), "Bugzilla REST client request");

    Ok(self.transport.get(&url)?)
  }
}

fn masked<'a>(pairs: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
  pairs
    .iter()
    .map(|&(k, v)| if SECRET_PARAMS.contains(&k) { (k, "***") } else { (k, v) })
    .collect()
}

/// Render a URL with secret query values masked.
pub fn redacted(url: &Url) -> String {
  let pairs: Vec<(String, String)> = url
    .query_pairs()
    .map(|(k, v)| {
      let v = if SECRET_PARAMS.contains(&k.as_ref()) {
        "***".to_string()
      } else {
        v.into_owned()
      };
      (k.into_owned(), v)
    })
    .collect();

  let mut clean = url.clone();
  if !pairs.is_empty() {
    clean.query_pairs_mut().clear().extend_pairs(&pairs);
  }
  clean.to_string()
}
