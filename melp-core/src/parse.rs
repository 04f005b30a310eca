//! Parsing of event source emissions.
//!
//! An emission is a JSON object mapping event titles to start times:
//!
//! ```json
//! { "Standup": "2024-01-01 09:30", "Lunch": "2024-01-01 12:00" }
//! ```
//!
//! Titles are not unique; on duplicate keys the last value wins and the entry
//! keeps the position of its first occurrence.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, EventBatch};

/// Prefix the event source uses for human-readable failures
/// (unknown calendar, access denied).
const SOURCE_ERROR_PREFIX: &str = "ERROR:";

/// Local wall-clock formats, tried in order after RFC 3339.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Why an emission was discarded.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("event source reported: {0}")]
    Reported(String),

    #[error("event data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected an object of event titles to start times, got {0}")]
    Shape(&'static str),

    #[error("start time for '{0}' is not a string")]
    NonStringStart(String),
}

/// Parse an emission, reading wall-clock times in the local time zone.
pub fn parse_batch(raw: &str) -> Result<EventBatch, ParseError> {
    parse_batch_in(raw, &Local)
}

/// Parse an emission, reading wall-clock times in `tz`.
///
/// Entries whose value is a string but not a recognisable date-time are
/// skipped with a warning; everything else that does not fit the expected
/// shape rejects the whole emission.
pub fn parse_batch_in<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<EventBatch, ParseError> {
    let trimmed = raw.trim();
    if let Some(message) = trimmed.strip_prefix(SOURCE_ERROR_PREFIX) {
        return Err(ParseError::Reported(message.trim().to_string()));
    }

    let map = match serde_json::from_str::<Value>(trimmed)? {
        Value::Object(map) => map,
        other => return Err(ParseError::Shape(kind_of(&other))),
    };

    let mut events = Vec::with_capacity(map.len());
    for (title, value) in map {
        let Value::String(text) = value else {
            return Err(ParseError::NonStringStart(title));
        };
        match parse_start(&text, tz) {
            Some(start) => events.push(Event { title, start }),
            None => {
                tracing::warn!(%title, value = %text, "skipping event with unreadable start time")
            }
        }
    }

    Ok(events)
}

/// Parse a single start time. RFC 3339 strings carry their own offset; all
/// other formats are wall-clock times in `tz`. Times in a DST gap yield
/// `None`, ambiguous ones resolve to the earlier instant.
pub fn parse_start<Tz: TimeZone>(text: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
