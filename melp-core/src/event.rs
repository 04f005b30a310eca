//! Event types produced by one refresh cycle.

use chrono::{DateTime, Utc};

/// A calendar event as reported by the event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub title: String,
    pub start: DateTime<Utc>,
}

impl Event {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>) -> Self {
        Event {
            title: title.into(),
            start,
        }
    }
}

/// Events from a single emission, in the order the source listed them.
///
/// Each emission is a full snapshot of the calendar, never a diff, so a batch
/// is discarded as soon as the next event has been selected from it.
pub type EventBatch = Vec<Event>;
