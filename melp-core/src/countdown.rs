//! The countdown to the next event.
//!
//! At most one countdown is live at a time. Its ticker is owned by a
//! [`CountdownHandle`] held inside the [`CountdownScheduler`], so replacing or
//! cancelling a countdown drops the ticker on the spot: no tick for the old
//! target can be observed afterwards.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// How often a running countdown refreshes its display.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    /// The last countdown ran out. Transient: `start` is accepted right away.
    Completed,
}

/// Snapshot of the current countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownState {
    pub target: DateTime<Utc>,
    pub is_active: bool,
}

/// Outcome of evaluating a tick against the wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Time left, formatted as `HH:MM:SS`.
    Remaining(String),
    /// The target has passed; the countdown has been torn down.
    Completed,
}

/// A live countdown. Owns the periodic ticker; consuming it with
/// [`CountdownHandle::cancel`] (or dropping it) stops all further ticks.
#[derive(Debug)]
pub struct CountdownHandle {
    target: DateTime<Utc>,
    ticker: Interval,
}

impl CountdownHandle {
    fn start(target: DateTime<Utc>, period: Duration) -> Self {
        // First tick one period after start, like a plain repeating timer.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        CountdownHandle { target, ticker }
    }

    pub fn target(&self) -> DateTime<Utc> {
        self.target
    }

    pub fn cancel(self) -> DateTime<Utc> {
        self.target
    }
}

#[derive(Debug)]
pub struct CountdownScheduler {
    active: Option<CountdownHandle>,
    phase: Phase,
    period: Duration,
}

impl Default for CountdownScheduler {
    fn default() -> Self {
        Self::new(TICK_PERIOD)
    }
}

impl CountdownScheduler {
    pub fn new(period: Duration) -> Self {
        CountdownScheduler {
            active: None,
            phase: Phase::Idle,
            period,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn target(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(CountdownHandle::target)
    }

    pub fn state(&self) -> Option<CountdownState> {
        self.target().map(|target| CountdownState {
            target,
            is_active: self.phase == Phase::Running,
        })
    }

    /// Start counting down to `target`, cancelling any running countdown
    /// first. Returns the target that was superseded, if any.
    pub fn start(&mut self, target: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let previous = self.cancel();
        self.active = Some(CountdownHandle::start(target, self.period));
        self.phase = Phase::Running;
        previous
    }

    /// Stop the running countdown, if any, and return its target.
    pub fn cancel(&mut self) -> Option<DateTime<Utc>> {
        let handle = self.active.take()?;
        self.phase = Phase::Idle;
        Some(handle.cancel())
    }

    /// Wait for the next tick of the running countdown. Never resolves while
    /// idle. Cancel safe, so it can sit in a `select!` loop.
    pub async fn ticked(&mut self) {
        match self.active.as_mut() {
            Some(handle) => {
                handle.ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Evaluate one tick at wall-clock time `now`.
    ///
    /// Returns `None` when no countdown is running. Once the target has
    /// passed the countdown is torn down and `Tick::Completed` is returned,
    /// which can therefore only happen once per started countdown.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Tick> {
        let target = self.target()?;
        let distance = (target - now).num_milliseconds();

        if distance >= 0 {
            return Some(Tick::Remaining(format_remaining(distance)));
        }

        self.active = None;
        self.phase = Phase::Completed;
        Some(Tick::Completed)
    }
}

/// Format a non-negative distance in milliseconds as `HH:MM:SS`.
///
/// Hours wrap at a day, matching a same-day countdown.
pub fn format_remaining(distance_ms: i64) -> String {
    let hours = (distance_ms / MS_PER_HOUR) % 24;
    let minutes = (distance_ms / MS_PER_MINUTE) % 60;
    let seconds = (distance_ms / MS_PER_SECOND) % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
