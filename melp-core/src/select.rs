//! Choosing which event to count down to.

use chrono::{DateTime, Utc};

use crate::event::Event;

/// Returns the event starting soonest strictly after `reference`.
///
/// Events starting at or before `reference` are never chosen. When two events
/// share the smallest positive distance, the one listed first wins, so the
/// result depends on the order the source emitted them in.
pub fn select_next(reference: DateTime<Utc>, events: &[Event]) -> Option<&Event> {
    let mut nearest: Option<&Event> = None;

    for event in events {
        if event.start <= reference {
            continue;
        }
        if nearest.is_none_or(|best| event.start < best.start) {
            nearest = Some(event);
        }
    }

    nearest
}
