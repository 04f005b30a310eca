//! The refresh orchestrator and its event loop.
//!
//! Every refresh cause ends up here as an [`AppEvent::Emission`]: a manual
//! refresh, a calendar change reported by the watcher, and a countdown that
//! ran out. Emissions, commands and countdown ticks are handled one at a time
//! on a single task, so a tick never sees a target that is being replaced.

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::countdown::{CountdownScheduler, Tick};
use crate::parse::{ParseError, parse_batch};
use crate::presenter::{Command, TrayPresenter};
use crate::select::select_next;
use crate::source::EventSource;

/// Everything the event loop reacts to, apart from countdown ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Raw output from the event source.
    Emission(String),
    /// A user request from the presenter.
    Command(Command),
}

/// What became of one emission.
#[derive(Debug)]
pub enum RefreshOutcome {
    Started {
        title: String,
        target: DateTime<Utc>,
        replaced: Option<DateTime<Utc>>,
    },
    /// The emission could not be read; the countdown was left alone.
    Discarded(ParseError),
    /// Nothing left today; the countdown was left alone.
    NoUpcomingEvent,
}

pub struct AppState<S, P> {
    scheduler: CountdownScheduler,
    source: S,
    presenter: P,
}

impl<S: EventSource, P: TrayPresenter> AppState<S, P> {
    pub fn new(scheduler: CountdownScheduler, source: S, presenter: P) -> Self {
        AppState {
            scheduler,
            source,
            presenter,
        }
    }

    pub fn scheduler(&self) -> &CountdownScheduler {
        &self.scheduler
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Parse an emission and count down to its next event.
    pub fn handle_emission(&mut self, raw: &str, now: DateTime<Utc>) -> RefreshOutcome {
        self.handle_emission_with(raw, now, parse_batch)
    }

    /// Like [`AppState::handle_emission`], with the parser supplied by the
    /// caller (for a fixed time zone).
    pub fn handle_emission_with<F>(
        &mut self,
        raw: &str,
        now: DateTime<Utc>,
        parse: F,
    ) -> RefreshOutcome
    where
        F: FnOnce(&str) -> Result<crate::EventBatch, ParseError>,
    {
        let events = match parse(raw) {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("discarding event data: {e}");
                return RefreshOutcome::Discarded(e);
            }
        };

        // A running countdown stays as is, even if its event is gone.
        let Some(next) = select_next(now, &events) else {
            tracing::error!(events = events.len(), "unable to find the next event");
            return RefreshOutcome::NoUpcomingEvent;
        };

        let replaced = self.scheduler.start(next.start);
        tracing::info!(title = %next.title, target = %next.start, "counting down to next event");

        RefreshOutcome::Started {
            title: next.title.clone(),
            target: next.start,
            replaced,
        }
    }

    /// Evaluate a countdown tick and update the display.
    pub fn handle_tick(&mut self, now: DateTime<Utc>) -> Option<Tick> {
        let tick = self.scheduler.tick(now)?;
        match &tick {
            Tick::Remaining(text) => self.presenter.set_title(text),
            Tick::Completed => {
                self.presenter.set_title("");
                tracing::info!("timer finished");
                self.source.request_refresh();
            }
        }
        Some(tick)
    }

    pub fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Refresh => {
                self.source.request_refresh();
                ControlFlow::Continue(())
            }
            Command::Quit => ControlFlow::Break(()),
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, now: DateTime<Utc>) -> ControlFlow<()> {
        match event {
            AppEvent::Emission(raw) => {
                self.handle_emission(&raw, now);
                ControlFlow::Continue(())
            }
            AppEvent::Command(command) => self.handle_command(command),
        }
    }

    /// Run until a quit command arrives or every event sender is gone.
    pub async fn run(mut self, mut events: UnboundedReceiver<AppEvent>) -> Self {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle_event(event, Utc::now()).is_break() {
                        break;
                    }
                }
                () = self.scheduler.ticked() => {
                    self.handle_tick(Utc::now());
                }
            }
        }

        self.scheduler.cancel();
        self.presenter.set_title("");
        tracing::info!("shutting down");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::countdown::{Phase, TICK_PERIOD};
    use crate::parse::parse_batch_in;
    use chrono::{TimeDelta, TimeZone};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct CountingSource {
        refreshes: usize,
    }

    impl EventSource for CountingSource {
        fn request_refresh(&mut self) {
            self.refreshes += 1;
        }
    }

    #[derive(Default)]
    struct RecordingTray {
        titles: Vec<String>,
    }

    impl TrayPresenter for RecordingTray {
        fn set_title(&mut self, title: &str) {
            self.titles.push(title.to_string());
        }
    }

    type TestApp = AppState<CountingSource, RecordingTray>;

    fn app() -> TestApp {
        AppState::new(
            CountdownScheduler::default(),
            CountingSource::default(),
            RecordingTray::default(),
        )
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn emit(app: &mut TestApp, raw: &str, now: DateTime<Utc>) -> RefreshOutcome {
        app.handle_emission_with(raw, now, |raw| parse_batch_in(raw, &Utc))
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_starts_countdown_to_next_event() {
        let mut app = app();
        let raw = r#"{"Standup": "2024-01-01T00:05:00", "Lunch": "2024-01-01T00:00:00"}"#;

        let outcome = emit(&mut app, raw, at(0, 0, 0));

        match outcome {
            RefreshOutcome::Started { title, target, replaced } => {
                assert_eq!(title, "Standup");
                assert_eq!(target, at(0, 5, 0));
                assert_eq!(replaced, None);
            }
            other => panic!("Expected Started, got {other:?}"),
        }
        assert_eq!(app.scheduler().phase(), Phase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_emission_keeps_countdown() {
        let mut app = app();
        emit(&mut app, r#"{"Standup": "2024-01-01 09:30"}"#, at(9, 0, 0));

        let outcome = emit(&mut app, "{not json", at(9, 0, 1));

        assert!(matches!(outcome, RefreshOutcome::Discarded(ParseError::Json(_))));
        assert_eq!(app.scheduler().target(), Some(at(9, 30, 0)));

        let outcome = emit(&mut app, "ERROR: Access to iCal application denied.", at(9, 0, 2));
        assert!(matches!(outcome, RefreshOutcome::Discarded(ParseError::Reported(_))));
        assert_eq!(app.scheduler().target(), Some(at(9, 30, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_upcoming_event_keeps_countdown() {
        let mut app = app();
        emit(&mut app, r#"{"Standup": "2024-01-01 09:30"}"#, at(9, 0, 0));

        let outcome = emit(&mut app, r#"{"Breakfast": "2024-01-01 07:00"}"#, at(9, 0, 5));
        assert!(matches!(outcome, RefreshOutcome::NoUpcomingEvent));
        assert_eq!(app.scheduler().target(), Some(at(9, 30, 0)));

        let outcome = emit(&mut app, "{}", at(9, 0, 6));
        assert!(matches!(outcome, RefreshOutcome::NoUpcomingEvent));
        assert_eq!(app.scheduler().target(), Some(at(9, 30, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_emission_replaces_countdown() {
        let mut app = app();
        emit(&mut app, r#"{"Standup": "2024-01-01 09:30"}"#, at(9, 0, 0));

        let outcome = emit(&mut app, r#"{"Standup": "2024-01-01 09:15"}"#, at(9, 0, 1));

        assert!(matches!(
            outcome,
            RefreshOutcome::Started { replaced: Some(t), .. } if t == at(9, 30, 0)
        ));
        app.handle_tick(at(9, 0, 2));
        assert_eq!(app.presenter().titles, vec!["00:14:58"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_update_title() {
        let mut app = app();
        emit(&mut app, r#"{"Planning": "2024-01-01 10:02:05"}"#, at(9, 0, 0));

        app.handle_tick(at(9, 0, 0));
        app.handle_tick(at(9, 0, 1));

        assert_eq!(app.presenter().titles, vec!["01:02:05", "01:02:04"]);
        assert_eq!(app.source().refreshes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_clears_title_and_refreshes_once() {
        let mut app = app();
        emit(&mut app, r#"{"Standup": "2024-01-01 09:30"}"#, at(9, 29, 59));

        app.handle_tick(at(9, 30, 0));
        let past = at(9, 30, 0) + TimeDelta::milliseconds(500);
        assert_eq!(app.handle_tick(past), Some(Tick::Completed));
        assert_eq!(app.handle_tick(past + TimeDelta::seconds(1)), None);
        assert_eq!(app.handle_tick(past + TimeDelta::seconds(2)), None);

        assert_eq!(app.presenter().titles, vec!["00:00:00", ""]);
        assert_eq!(app.source().refreshes, 1);
        assert_eq!(app.scheduler().phase(), Phase::Completed);

        emit(&mut app, r#"{"Lunch": "2024-01-01 12:00"}"#, at(9, 30, 1));
        assert_eq!(app.scheduler().phase(), Phase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands() {
        let mut app = app();

        assert!(app.handle_command(Command::Refresh).is_continue());
        assert_eq!(app.source().refreshes, 1);
        assert!(app.handle_command(Command::Quit).is_break());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_quit() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(AppEvent::Command(Command::Refresh)).unwrap();
        tx.send(AppEvent::Emission("{not json".to_string())).unwrap();
        tx.send(AppEvent::Command(Command::Quit)).unwrap();

        let app = app().run(rx).await;

        assert_eq!(app.source().refreshes, 1);
        assert_eq!(app.presenter().titles, vec![""]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_senders_are_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);

        let app = app().run(rx).await;

        assert_eq!(app.scheduler().phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_for_replacement_target_only() {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        let later = now + TimeDelta::hours(5);
        let sooner = now + TimeDelta::hours(2);
        tx.send(AppEvent::Emission(format!(r#"{{"Offsite": "{}"}}"#, later.to_rfc3339())))
            .unwrap();
        tx.send(AppEvent::Emission(format!(r#"{{"Review": "{}"}}"#, sooner.to_rfc3339())))
            .unwrap();

        let running = tokio::spawn(app().run(rx));
        tokio::time::sleep(3 * TICK_PERIOD + TICK_PERIOD / 2).await;
        tx.send(AppEvent::Command(Command::Quit)).unwrap();
        let app = running.await.unwrap();

        let titles = &app.presenter().titles;
        assert_eq!(titles.len(), 4, "three ticks then the cleared title: {titles:?}");
        for title in &titles[..3] {
            assert!(
                title == "02:00:00" || title.starts_with("01:59:"),
                "tick for the replaced target: {title}"
            );
        }
        assert_eq!(titles[3], "");
        assert_eq!(app.scheduler().phase(), Phase::Idle);
    }
}
