//! Timestamp helpers for database storage.
//!
//! Timestamps are stored as fixed-width UTC text so that SQLite string
//! comparison orders them chronologically.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp for storage (`2024-01-15T10:30:00.000000Z`).
pub fn to_db(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 and the SQLite `datetime('now')` format.
pub fn parse_db(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Parse a stored timestamp, falling back to the epoch for corrupt values.
pub fn parse_db_or_epoch(s: &str) -> DateTime<Utc> {
    parse_db(s).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
