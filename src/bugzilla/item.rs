//! Metadata envelope for every bug handed to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::error::BackendError;
use super::types::Bug;
use crate::dates;

pub const BACKEND_NAME: &str = "BugzillaREST";
pub const BACKEND_VERSION: &str = "0.1.0";
pub const CATEGORY: &str = "bug";

/// A bug together with where and when it was harvested.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
  pub backend_name: &'static str,
  pub backend_version: &'static str,
  pub bzharvest_version: &'static str,
  /// When this item was produced (unix seconds)
  pub timestamp: f64,
  pub origin: String,
  /// Stable across runs: derived from origin and bug id only
  pub uuid: String,
  /// `last_change_time` as unix seconds
  pub updated_on: f64,
  pub category: &'static str,
  pub data: Bug,
}

impl Item {
  pub fn new(origin: &str, bug: Bug) -> Result<Self, BackendError> {
    let updated_on = updated_on_of(&bug)?;
    let uuid = uuid(origin, &id_of(&bug));

    Ok(Self {
      backend_name: BACKEND_NAME,
      backend_version: BACKEND_VERSION,
      bzharvest_version: env!("CARGO_PKG_VERSION"),
      timestamp: unix_seconds(Utc::now()),
      origin: origin.to_string(),
      uuid,
      updated_on,
      category: CATEGORY,
      data: bug,
    })
  }
}

/// Identifier of a bug, as a string.
pub fn id_of(bug: &Bug) -> String {
  bug.id.to_string()
}

/// Unix timestamp of the bug's `last_change_time`, honoring its timezone.
pub fn updated_on_of(bug: &Bug) -> Result<f64, BackendError> {
  let ts =
    dates::parse_datetime(&bug.last_change_time).map_err(|source| BackendError::Timestamp {
      value: bug.last_change_time.clone(),
      source,
    })?;
  Ok(unix_seconds(ts))
}

/// Hex SHA-256 of `<origin>:<id>`.
pub fn uuid(origin: &str, id: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(origin.as_bytes());
  hasher.update(b":");
  hasher.update(id.as_bytes());
  hex::encode(hasher.finalize())
}

fn unix_seconds(dt: DateTime<Utc>) -> f64 {
  dt.timestamp_micros() as f64 / 1_000_000.0
}
