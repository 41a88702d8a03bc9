//! ID and timestamp utilities
//!
//! Entity and event identifiers are UUID v4 strings; timestamps are UTC.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{JobBuildaError, Result};

/// Generate a new entity or event ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as an RFC 3339 string with millisecond precision
pub fn now_rfc3339() -> String {
    to_rfc3339(&now())
}

/// Format a timestamp the way it is stored in the database
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date supplied by a caller
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| JobBuildaError::validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, value)))
}

/// Format a document number such as `INV-00042`
pub fn document_number(prefix: &str, n: i64) -> String {
    format!("{}-{:05}", prefix, n)
}
