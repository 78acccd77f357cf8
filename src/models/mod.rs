pub mod entity;
pub mod enums;
pub mod field_change;
pub mod link;

pub use entity::*;
pub use field_change::*;
pub use link::*;

use chrono::{NaiveDateTime, Timelike, Utc};

use crate::db::DatabaseError;

/// Storage and audit format for every timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time truncated to whole seconds, matching what the store keeps.
pub fn now() -> NaiveDateTime {
    let ts = Utc::now().naive_utc();
    ts.with_nanosecond(0).unwrap_or(ts)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp '{s}': {e}")))
}
