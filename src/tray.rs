//! The menu-bar tray icon.
//!
//! The icon, its menu and its event loop belong to the main thread. The
//! countdown runs elsewhere and reaches the tray through an
//! [`EventLoopProxy`]: titles travel as [`TrayEvent`]s, and menu clicks come
//! back as [`AppEvent::Command`]s on the app's event channel.

use anyhow::{Context, Result};
use melp_core::app::AppEvent;
use melp_core::presenter::{Command, TrayPresenter};
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoop, EventLoopProxy};
use tokio::sync::mpsc::UnboundedSender;
use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Hover text of the tray icon.
pub const TOOLTIP: &str = "Meeting helper";

/// Edge length of the generated icon, the usual menu-bar size.
const ICON_SIZE: u32 = 22;

/// Requests for the main-thread event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayEvent {
    /// Show this title next to the icon, or none.
    Title(Option<String>),
    /// The app has stopped; remove the icon and leave the event loop.
    Exit,
}

/// Where title updates are delivered. Returns false once nobody is
/// listening any more.
pub trait TitleSink {
    fn send_title(&self, title: Option<String>) -> bool;
}

impl TitleSink for EventLoopProxy<TrayEvent> {
    fn send_title(&self, title: Option<String>) -> bool {
        self.send_event(TrayEvent::Title(title)).is_ok()
    }
}

/// [`TrayPresenter`] for the tray icon, usable from any thread.
pub struct TrayTitle<S> {
    sink: S,
    title: String,
}

impl<S: TitleSink> TrayTitle<S> {
    pub fn new(sink: S) -> Self {
        TrayTitle {
            sink,
            title: String::new(),
        }
    }
}

impl<S: TitleSink> TrayPresenter for TrayTitle<S> {
    fn set_title(&mut self, title: &str) {
        if title == self.title {
            return;
        }
        self.title = title.to_string();

        let shown = (!title.is_empty()).then(|| title.to_string());
        if !self.sink.send_title(shown) {
            tracing::debug!("tray is gone, dropping title update");
        }
    }
}

/// Forward a clicked menu entry to the event loop. Returns the command, if
/// the id belongs to one.
pub fn forward_menu_click(events: &UnboundedSender<AppEvent>, id: &str) -> Option<Command> {
    let command = Command::from_menu_id(id)?;
    if events.send(AppEvent::Command(command)).is_err() {
        tracing::debug!(?command, "event loop is gone, ignoring menu click");
    }
    Some(command)
}

/// Route menu clicks from the tray to `events`.
pub fn forward_menu_events(events: UnboundedSender<AppEvent>) {
    MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
        if forward_menu_click(&events, event.id.0.as_str()).is_none() {
            tracing::debug!(id = %event.id.0, "unknown menu entry");
        }
    }));
}

/// Refresh, a separator, then Quit.
fn build_menu() -> Result<Menu> {
    let menu = Menu::new();
    let refresh = MenuItem::with_id(
        Command::Refresh.menu_id(),
        Command::Refresh.label(),
        true,
        None,
    );
    let quit = MenuItem::with_id(Command::Quit.menu_id(), Command::Quit.label(), true, None);

    menu.append_items(&[&refresh, &PredefinedMenuItem::separator(), &quit])
        .context("Failed to build the tray menu")?;

    Ok(menu)
}

fn build_tray(menu: &Menu) -> Result<TrayIcon> {
    let icon = Icon::from_rgba(clock_icon(ICON_SIZE), ICON_SIZE, ICON_SIZE)
        .context("Failed to create the tray icon image")?;

    TrayIconBuilder::new()
        .with_menu(Box::new(menu.clone()))
        .with_tooltip(TOOLTIP)
        .with_icon(icon)
        .build()
        .context("Failed to create the tray icon")
}

/// RGBA pixels of a white ring with a centre dot.
fn clock_icon(size: u32) -> Vec<u8> {
    let mut rgba = vec![0u8; (size * size * 4) as usize];
    let center = size as f32 / 2.0;
    let outer = center - 1.0;
    let inner = outer - 2.5;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();

            if (inner..=outer).contains(&dist) || dist <= 2.0 {
                let idx = ((y * size + x) * 4) as usize;
                rgba[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }

    rgba
}

/// Run the tray on the main thread until a [`TrayEvent::Exit`] arrives.
///
/// If the icon cannot be created, the app is asked to quit through `events`
/// and the loop waits for its exit as usual.
pub fn run(event_loop: EventLoop<TrayEvent>, events: UnboundedSender<AppEvent>) -> Result<()> {
    let menu = build_menu()?;
    let mut tray: Option<TrayIcon> = None;

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::NewEvents(StartCause::Init) => match build_tray(&menu) {
                Ok(icon) => tray = Some(icon),
                Err(e) => {
                    tracing::error!("{e:#}");
                    let _ = events.send(AppEvent::Command(Command::Quit));
                }
            },
            Event::UserEvent(TrayEvent::Title(title)) => {
                if let Some(icon) = &tray {
                    icon.set_title(title.as_deref());
                }
            }
            Event::UserEvent(TrayEvent::Exit) => {
                tray.take();
                *control_flow = ControlFlow::Exit;
            }
            _ => {}
        }
    })
}
