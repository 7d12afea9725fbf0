//! Date parsing for command-line, config and server timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Parse a timestamp and normalize it to UTC.
///
/// Accepts RFC 3339 (`2016-01-01T10:00:00Z`, `2016-01-01T12:00:00+02:00`),
/// `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`. The last two are read as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
  let s = s.trim();

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
    return Ok(dt.with_timezone(&Utc));
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
    return Ok(dt.and_utc());
  }

  NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN).and_utc())
}
