//! Reading a calendar directory of .ics files.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{read_calendar, unfold},
};
use serde_json::{Map, Value};

/// Start-time format expected by melp.
const START_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub title: String,
    pub start: DateTime<Utc>,
}

/// Load every event in the `.ics` files of `dir`. Files that cannot be read
/// or parsed are skipped with a warning.
pub fn load_events<Tz: TimeZone>(dir: &Path, local: &Tz) -> Result<Vec<SourceEvent>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Could not read calendar directory {}", dir.display()))?;

    let mut events = Vec::new();
    for path in entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "ics"))
    {
        match std::fs::read_to_string(&path) {
            Ok(content) => events.extend(parse_events(&content, local)),
            Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable file: {e}"),
        }
    }

    Ok(events)
}

/// Parse the VEVENTs of one .ics document. Events without a usable DTSTART
/// are left out; recurrence rules are not expanded.
pub fn parse_events<Tz: TimeZone>(content: &str, local: &Tz) -> Vec<SourceEvent> {
    let unfolded = unfold(content);
    let calendar = match read_calendar(&unfolded) {
        Ok(calendar) => calendar,
        Err(e) => {
            tracing::warn!("skipping invalid calendar data: {e}");
            return Vec::new();
        }
    };

    calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let title = vevent
                .find_prop("SUMMARY")
                .map(|p| p.val.to_string())
                .unwrap_or_else(|| "(No title)".to_string());
            let dtstart = DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?;
            let start = to_utc(dtstart, local)?;
            Some(SourceEvent { title, start })
        })
        .collect()
}

/// Resolve a DTSTART to an instant. Floating times and all-day dates are
/// read as wall time in `local`; an unknown TZID falls back to the same.
fn to_utc<Tz: TimeZone>(dpt: DatePerhapsTime, local: &Tz) -> Option<DateTime<Utc>> {
    match dpt {
        DatePerhapsTime::Date(date) => wall_time(date.and_hms_opt(0, 0, 0)?, local),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => wall_time(naive, local),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => wall_time(date_time, &tz),
                Err(_) => {
                    tracing::debug!(%tzid, "unknown time zone, reading as local time");
                    wall_time(date_time, local)
                }
            }
        }
    }
}

fn wall_time<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Longest stretch of wall time a DST transition can skip.
const MAX_GAP_MINUTES: i64 = 3 * 60;

/// First instant of `day` in `tz`. When midnight falls in a DST gap the day
/// starts where the gap ends.
fn start_of_day<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Option<DateTime<Utc>> {
    let midnight = day.and_hms_opt(0, 0, 0)?;
    (0..=MAX_GAP_MINUTES).find_map(|minutes| wall_time(midnight + Duration::minutes(minutes), tz))
}

/// Events starting on `day` in local time (from its first instant up to the
/// next day's), earliest first. Days are not assumed to last 24 hours.
pub fn events_on<Tz: TimeZone>(
    events: &[SourceEvent],
    day: NaiveDate,
    local: &Tz,
) -> Vec<SourceEvent> {
    let (Some(start), Some(end)) = (
        start_of_day(day, local),
        day.succ_opt().and_then(|next| start_of_day(next, local)),
    ) else {
        return Vec::new();
    };

    let mut today: Vec<SourceEvent> = events
        .iter()
        .filter(|e| e.start >= start && e.start < end)
        .cloned()
        .collect();
    today.sort_by_key(|e| e.start);
    today
}

/// Render events as the JSON object melp reads: title to local start time.
/// A repeated title keeps its last start time.
pub fn render<Tz: TimeZone>(events: &[SourceEvent], local: &Tz) -> Result<String>
where
    Tz::Offset: std::fmt::Display,
{
    let mut list = Map::new();
    for event in events {
        let start = event.start.with_timezone(local).format(START_FORMAT).to_string();
        list.insert(event.title.clone(), Value::String(start));
    }

    serde_json::to_string_pretty(&list).context("Unable to convert events to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use chrono_tz::America::Santiago;
    use chrono_tz::Europe::Berlin;

    const DAY: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:TEST
BEGIN:VEVENT
UID:standup
SUMMARY:Standup
DTSTART:20240101T093000Z
DTEND:20240101T094500Z
END:VEVENT
BEGIN:VEVENT
UID:lunch
SUMMARY:Lunch
DTSTART:20240101T120000
DTEND:20240101T130000
END:VEVENT
BEGIN:VEVENT
UID:offsite
SUMMARY:Offsite
DTSTART;VALUE=DATE:20240102
DTEND;VALUE=DATE:20240103
END:VEVENT
BEGIN:VEVENT
UID:no-start
SUMMARY:Broken
END:VEVENT
END:VCALENDAR"#;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn event(title: &str, start: &str) -> SourceEvent {
        SourceEvent {
            title: title.into(),
            start: utc(start),
        }
    }

    fn titles(events: &[SourceEvent]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_parse_events_resolves_start_times() {
        let events = parse_events(DAY, &Utc);

        assert_eq!(
            events,
            vec![
                event("Standup", "2024-01-01T09:30:00Z"),
                event("Lunch", "2024-01-01T12:00:00Z"),
                event("Offsite", "2024-01-02T00:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_floating_time_uses_local_zone() {
        let plus_one = FixedOffset::east_opt(3600).unwrap();

        let events = parse_events(DAY, &plus_one);

        assert_eq!(events[1].start, utc("2024-01-01T11:00:00Z"));
    }

    #[test]
    fn test_tzid_start() {
        let ics = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VEVENT\r\n\
UID:review\r\n\
SUMMARY:Review\r\n\
DTSTART;TZID=Europe/Berlin:20240101T100000\r\n\
END:VEVENT\r\n\
END:VCALENDAR";

        let events = parse_events(ics, &Utc);

        assert_eq!(events[0].start, utc("2024-01-01T09:00:00Z"));
    }

    #[test]
    fn test_events_on_keeps_only_that_day_sorted() {
        let mut events = parse_events(DAY, &Utc);
        events.push(event("Early", "2024-01-01T00:00:00Z"));
        events.push(event("Yesterday", "2023-12-31T23:59:59Z"));
        events.push(event("Late", "2024-01-01T23:59:59Z"));

        let today = events_on(&events, jan(1), &Utc);

        assert_eq!(titles(&today), vec!["Early", "Standup", "Lunch", "Late"]);
    }

    #[test]
    fn test_events_on_long_dst_day() {
        // Berlin falls back on 2024-10-27; the day has 25 hours.
        let events = vec![
            event("Early", "2024-10-26T22:00:00Z"),
            event("Late", "2024-10-27T22:30:00Z"),
            event("Tomorrow", "2024-10-27T23:00:00Z"),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();

        let today = events_on(&events, day, &Berlin);

        assert_eq!(titles(&today), vec!["Early", "Late"]);
    }

    #[test]
    fn test_events_on_short_dst_day() {
        // Berlin springs forward on 2024-03-31; the day has 23 hours.
        let events = vec![
            event("Early", "2024-03-30T23:00:00Z"),
            event("Late", "2024-03-31T21:30:00Z"),
            event("Tomorrow", "2024-03-31T22:30:00Z"),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();

        let today = events_on(&events, day, &Berlin);

        assert_eq!(titles(&today), vec!["Early", "Late"]);
    }

    #[test]
    fn test_events_on_day_starting_in_dst_gap() {
        // Santiago skips 00:00-01:00 on 2024-09-08; the day starts at 01:00 -03.
        let events = vec![
            event("Yesterday", "2024-09-08T03:30:00Z"),
            event("First", "2024-09-08T04:00:00Z"),
            event("Standup", "2024-09-08T12:00:00Z"),
        ];
        let day = NaiveDate::from_ymd_opt(2024, 9, 8).unwrap();

        let today = events_on(&events, day, &Santiago);

        assert_eq!(titles(&today), vec!["First", "Standup"]);
    }

    #[test]
    fn test_render_uses_local_minutes() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let events = vec![
            event("Standup", "2024-01-01T07:30:00Z"),
            event("Lunch", "2024-01-01T10:00:00Z"),
            event("Standup", "2024-01-01T13:15:00Z"),
        ];

        let json = render(&events, &plus_two).unwrap();

        assert_eq!(
            json,
            "{\n  \"Standup\": \"2024-01-01 15:15\",\n  \"Lunch\": \"2024-01-01 12:00\"\n}"
        );
    }

    #[test]
    fn test_render_empty_day() {
        assert_eq!(render(&[], &Utc).unwrap(), "{}");
    }

    #[test]
    fn test_load_events_reads_ics_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("day.ics"), DAY).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "BEGIN:VCALENDAR").unwrap();
        std::fs::write(dir.path().join("broken.ics"), "not a calendar").unwrap();

        let events = load_events(dir.path(), &Utc).unwrap();

        assert_eq!(events.len(), 3);
    }
}
