//! Listen mode: re-emit whenever the calendar directory changes.
//!
//! Changes are detected by polling a cheap fingerprint of the directory
//! (file names, sizes and modification times). The day rolling over also
//! counts as a change, since the emitted list only covers today.

use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use chrono::{Local, NaiveDate};

use crate::emit_today;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Option<Vec<(String, u64, Option<SystemTime>)>>);

/// Fingerprint the `.ics` files of `dir`. A missing directory has no
/// fingerprint, so creating it counts as a change.
pub fn fingerprint(dir: &Path) -> Fingerprint {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Fingerprint(None);
    };

    let mut files: Vec<(String, u64, Option<SystemTime>)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|e| e == "ics"))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            Some((name, metadata.len(), metadata.modified().ok()))
        })
        .collect();

    files.sort();
    Fingerprint(Some(files))
}

/// Poll `dir` forever, printing a fresh snapshot on every change.
pub async fn run(dir: &Path) -> Result<()> {
    let mut last = fingerprint(dir);
    let mut day: NaiveDate = Local::now().date_naive();

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let current = fingerprint(dir);
        let today = Local::now().date_naive();
        if current == last && today == day {
            continue;
        }

        tracing::debug!(calendar = %dir.display(), "calendar changed");
        last = current;
        day = today;
        emit_today(dir)?;
    }
}
