mod config;
mod singleton;
mod tray;

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use melp_core::app::{AppEvent, AppState};
use melp_core::countdown::CountdownScheduler;
use melp_core::presenter::Command;
use melp_core::source::{EventSource, ProcessSource, resolve_binary};
use tao::event_loop::{EventLoopBuilder, EventLoopProxy};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::config::MelpConfig;
use crate::tray::{TrayEvent, TrayTitle};

#[derive(Parser)]
#[command(name = "melp", version)]
#[command(about = "Count down to the next meeting in a calendar")]
struct Cli {
    /// Calendar to count down in (defaults to `calendar` from config.toml)
    #[arg(short, long)]
    calendar: Option<String>,

    /// Event source binary, by name or path (defaults to melp-source)
    #[arg(long)]
    source: Option<String>,

    /// Don't watch the calendar; only fetch on start, refresh and when a countdown ends
    #[arg(long)]
    no_listen: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Ensure only one instance is running. The tray loop below never
    // returns, so the guard is held until the process exits.
    let _lock = singleton::acquire_lock()?;

    let cfg = MelpConfig::load()?;

    let calendar = cli.calendar.or(cfg.calendar.clone()).with_context(|| {
        format!(
            "No calendar configured.\n\
            Pass --calendar <name> or set `calendar` in {}",
            MelpConfig::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "config.toml".into())
        )
    })?;
    let source_name = cli.source.unwrap_or_else(|| cfg.source_path());
    let binary = resolve_binary(&source_name)?;
    let listen = cfg.listen && !cli.no_listen;

    tracing::info!(%calendar, source = %binary.display(), listen, "starting");

    #[allow(unused_mut)]
    let mut event_loop = EventLoopBuilder::<TrayEvent>::with_user_event().build();

    // Menu bar only: no Dock icon, no app switcher entry.
    #[cfg(target_os = "macos")]
    {
        use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};
        event_loop.set_activation_policy(ActivationPolicy::Accessory);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let (tx, rx) = mpsc::unbounded_channel();
    tray::forward_menu_events(tx.clone());

    let proxy = event_loop.create_proxy();
    let app_tx = tx.clone();
    thread::spawn(move || {
        runtime.block_on(run_app(binary, calendar, listen, app_tx, rx, proxy.clone()));
        // Dropping the runtime kills the source children.
        drop(runtime);
        let _ = proxy.send_event(TrayEvent::Exit);
    });

    tray::run(event_loop, tx)
}

/// Wire the event source and the tray title to the countdown and run it
/// until the user quits.
async fn run_app(
    binary: PathBuf,
    calendar: String,
    listen: bool,
    tx: mpsc::UnboundedSender<AppEvent>,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    proxy: EventLoopProxy<TrayEvent>,
) {
    let mut source = ProcessSource::new(binary, calendar, tx.clone());
    spawn_quit_on_ctrl_c(tx);

    if listen {
        source.watch();
    } else {
        source.request_refresh();
    }

    let app = AppState::new(CountdownScheduler::default(), source, TrayTitle::new(proxy));
    app.run(rx).await;
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "melp=debug,melp_core=debug"
    } else {
        "melp=info,melp_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn spawn_quit_on_ctrl_c(events: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = events.send(AppEvent::Command(Command::Quit));
        }
    });
}
