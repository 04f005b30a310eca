//! melp-source - calendar event source for melp
//!
//! Prints today's events of one calendar as a JSON object of event titles
//! to start times (`yyyy-MM-dd HH:mm`, local time):
//!
//! ```text
//! melp-source -c work
//! {
//!   "Standup": "2024-01-01 09:30"
//! }
//! ```
//!
//! With `-l` it keeps running and prints a full snapshot again whenever the
//! calendar changes, including when a calendar that was unknown at start is
//! created. Without `-l` an unknown calendar exits with status 1.
//!
//! Failures are reported on stdout as a single `ERROR: ...` line so the
//! reader sees them in place of the JSON.

mod calendar;
mod config;
mod watch;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use chrono::{Local, NaiveDate, TimeZone};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::SourceConfig;

#[derive(Parser)]
#[command(name = "melp-source")]
#[command(about = "Print today's events of a caldir calendar as JSON")]
struct Cli {
    /// The name of the calendar directory
    #[arg(short = 'c', long = "calendarName")]
    calendar_name: String,

    /// Keep running and print again whenever the calendar changes
    #[arg(short = 'l', long)]
    listen: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let settings = SourceConfig::load()?;
    let calendar_dir = settings.data_path().join(&cli.calendar_name);

    let found = emit_today(&calendar_dir)?;
    if !found {
        tracing::debug!(path = %calendar_dir.display(), "no such calendar directory");
    }

    // Listening keeps going without the directory and emits once it shows up.
    if cli.listen {
        watch::run(&calendar_dir).await?;
    }

    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print today's events of the calendar in `dir` as one JSON snapshot on
/// stdout. Returns false if there is no such calendar.
pub fn emit_today(dir: &Path) -> Result<bool> {
    let mut stdout = std::io::stdout().lock();
    write_day(&mut stdout, dir, Local::now().date_naive(), &Local)
}

/// Write the events of `dir` starting on `day` to `out`, or a single
/// `ERROR:` line if they cannot be read. Returns false if `dir` is not a
/// calendar directory.
fn write_day<W, Tz>(out: &mut W, dir: &Path, day: NaiveDate, local: &Tz) -> Result<bool>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if !dir.is_dir() {
        report_error(out, "Unknown calendar name.")?;
        return Ok(false);
    }

    let events = match calendar::load_events(dir, local) {
        Ok(events) => events,
        Err(e) => {
            report_error(out, &format!("{e:#}"))?;
            return Ok(true);
        }
    };
    let today = calendar::events_on(&events, day, local);
    let json = calendar::render(&today, local)?;

    writeln!(out, "{json}")?;
    out.flush()?;

    Ok(true)
}

fn report_error<W: Write>(out: &mut W, message: &str) -> Result<()> {
    writeln!(out, "ERROR: {message}")?;
    out.flush()?;
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("melp_source=warn"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
