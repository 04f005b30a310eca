//! Event source subprocess.
//!
//! Event data comes from an external binary (by default `melp-source`) that
//! takes `-c <calendar>` and, in watch mode, `-l`. Each emission it prints on
//! stdout is a JSON object of event titles to start times, possibly spread
//! over several lines, or a single human-readable `ERROR: ...` line.
//!
//! The core never waits on the source: output is framed into emissions and
//! pushed onto the app's event channel as it arrives.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::de::IgnoredAny;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::app::AppEvent;
use crate::error::{MelpError, MelpResult};

/// Anything that can be asked for a fresh snapshot of the calendar.
///
/// Requests are fire-and-forget: the snapshot, if any, arrives later as an
/// [`AppEvent::Emission`].
pub trait EventSource {
    fn request_refresh(&mut self);
}

/// Splits a line stream into emissions.
///
/// A line that does not open a JSON object is an emission on its own. Other
/// lines are buffered until they make up a complete JSON value, or until the
/// buffer can no longer become one, in which case it is handed on as is and
/// rejected by the parser.
#[derive(Debug, Default)]
pub struct EmissionFramer {
    buf: String,
}

impl EmissionFramer {
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        if self.buf.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            if !trimmed.starts_with('{') {
                return Some(trimmed.to_string());
            }
        } else {
            self.buf.push('\n');
        }
        self.buf.push_str(line);

        match serde_json::from_str::<IgnoredAny>(&self.buf) {
            Err(e) if e.is_eof() => None,
            _ => Some(std::mem::take(&mut self.buf)),
        }
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.trim().is_empty() {
            self.buf.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }
}

/// Find the source binary: a path is used as given, a bare name is looked up
/// in `PATH`.
pub fn resolve_binary(name_or_path: &str) -> MelpResult<PathBuf> {
    let candidate = Path::new(name_or_path);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(MelpError::Source(format!(
            "Event source binary not found at {}",
            candidate.display()
        )));
    }

    which::which(name_or_path)
        .map_err(|_| MelpError::SourceNotInstalled(name_or_path.to_string()))
}

/// Pause before a watch-mode child that exited is started again.
pub const WATCH_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Runs the source binary as a child process for one calendar.
#[derive(Clone, Debug)]
pub struct ProcessSource {
    binary: PathBuf,
    calendar: String,
    events: UnboundedSender<AppEvent>,
    restart_delay: Duration,
}

impl ProcessSource {
    pub fn new(
        binary: PathBuf,
        calendar: impl Into<String>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        ProcessSource {
            binary,
            calendar: calendar.into(),
            events,
            restart_delay: WATCH_RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Start the long-lived watch-mode child, which emits once at start and
    /// again on every calendar change. A child that exits, for whatever
    /// reason, is started again after a pause until the event loop is gone.
    /// The child is killed when the task is dropped with the runtime.
    pub fn watch(&self) -> JoinHandle<()> {
        self.spawn(true)
    }

    fn spawn(&self, listen: bool) -> JoinHandle<()> {
        let mut args = Vec::with_capacity(3);
        if listen {
            args.push("-l".to_string());
        }
        args.push("-c".to_string());
        args.push(self.calendar.clone());

        let binary = self.binary.clone();
        let events = self.events.clone();
        let restart_delay = self.restart_delay;

        tokio::spawn(async move {
            loop {
                if let Err(e) = run_source(&binary, &args, &events).await {
                    tracing::error!(binary = %binary.display(), "event source failed: {e}");
                }
                if !listen || events.is_closed() {
                    break;
                }

                tracing::warn!(delay = ?restart_delay, "calendar watcher exited, restarting");
                tokio::time::sleep(restart_delay).await;
            }
        })
    }
}

impl EventSource for ProcessSource {
    fn request_refresh(&mut self) {
        tracing::debug!(calendar = %self.calendar, "requesting event refresh");
        self.spawn(false);
    }
}

async fn run_source(
    binary: &Path,
    args: &[String],
    events: &UnboundedSender<AppEvent>,
) -> MelpResult<()> {
    let mut child = TokioCommand::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MelpError::Source(format!("Failed to spawn {}: {}", binary.display(), e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MelpError::Source("Event source stdout was not captured".into()))?;

    forward_emissions(BufReader::new(stdout), events).await?;
    if events.is_closed() {
        // Event loop is gone; nobody is listening any more.
        return Ok(());
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(MelpError::Source(format!(
            "Event source exited with status: {}",
            status.code().unwrap_or(-1)
        )));
    }

    Ok(())
}

/// Frame `reader` into emissions and send them on until end of input.
///
/// Bytes that are not UTF-8 are replaced rather than treated as a read
/// error, so one bad line costs that emission only.
async fn forward_emissions<R>(mut reader: R, events: &UnboundedSender<AppEvent>) -> MelpResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut framer = EmissionFramer::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&line);
        if let Some(emission) = framer.push_line(text.trim_end_matches(['\n', '\r'])) {
            if events.send(AppEvent::Emission(emission)).is_err() {
                return Ok(());
            }
        }
    }
    if let Some(rest) = framer.finish() {
        let _ = events.send(AppEvent::Emission(rest));
    }

    Ok(())
}
