//! peak-aim-daemon: remaps held Q/E to a single output key
//!
//! While either trigger key is held the output key is held too, unless the
//! scope is open. A short right-click toggles the scope; holding the right
//! button keeps it open while held. F8 enables or disables the remap.
//!
//! Components:
//! - Input listener for right mouse button and the toggle hotkey (CGEventTap)
//! - Engine owning scope and output key state behind a single lock
//! - Poll loop (20 Hz enabled, 5 Hz disabled) and a 2 s watchdog
//! - Status line observer; SIGHUP reloads the output key and tap threshold

mod config;
mod events;
mod input;
mod lifecycle;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Settings};
use crate::events::{EngineEvent, StatusSnapshot};
use crate::input::{InputBackend, InputError, InputEvent};
use crate::lifecycle::{ReloadSignal, ShutdownSignal};
use crate::state::{run_input_dispatch, run_poll_loop, run_watchdog, Engine, Timing};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "peak-aim-daemon starting"
    );

    let config = Config::load().context("failed to load configuration")?;
    info!(
        config_path = ?config.config_path,
        data_dir = ?config.data_dir,
        output_key = %config.settings.output_key,
        "configuration loaded"
    );
    let settings = &config.settings;
    let mut live = settings.clone();

    let mut shutdown = ShutdownSignal::new().context("failed to register shutdown signals")?;
    let mut reload = ReloadSignal::new().context("failed to register reload signal")?;

    // Listener -> engine
    let (input_tx, input_rx) = mpsc::channel::<InputEvent>(64);
    // Engine -> observers
    let (event_tx, _) = broadcast::channel::<EngineEvent>(64);
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
    // Stop signal for every task
    let (stop_tx, _) = broadcast::channel::<()>(1);

    let backend = platform_backend().context("input backend unavailable")?;
    let engine = Arc::new(Engine::new(
        backend,
        settings,
        Box::new(status_tx),
        event_tx.clone(),
    ));

    #[cfg(target_os = "macos")]
    let listener = {
        let listener = input::InputListener::new(input_tx, settings.toggle_hotkey);
        match listener.start() {
            Ok(()) => info!(toggle_hotkey = %settings.toggle_hotkey, "input listener started"),
            Err(e) => {
                error!(?e, "failed to start input listener");
                warn!("continuing without scope or hotkey support - check Accessibility permissions");
            }
        }
        listener
    };
    #[cfg(not(target_os = "macos"))]
    drop(input_tx);

    let timing = Timing::from(settings);
    let poll = tokio::spawn(run_poll_loop(engine.clone(), timing, stop_tx.subscribe()));
    let watchdog = tokio::spawn(run_watchdog(
        engine.clone(),
        timing.watchdog,
        stop_tx.subscribe(),
    ));
    let dispatch = tokio::spawn(run_input_dispatch(
        engine.clone(),
        input_rx,
        stop_tx.subscribe(),
    ));
    let observer = tokio::spawn(observe(
        event_tx.subscribe(),
        status_rx,
        stop_tx.subscribe(),
    ));

    info!(enabled = engine.is_enabled(), "daemon initialized, entering main loop");

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                info!("shutdown signal received");
                break;
            }
            Some(()) = reload.next() => {
                reload_settings(&config, &mut live, &engine);
            }
        }
    }

    // Cleanup
    info!("shutting down...");
    let _ = stop_tx.send(());

    #[cfg(target_os = "macos")]
    listener.stop();

    for (name, task) in [("poll loop", poll), ("watchdog", watchdog), ("input dispatch", dispatch)] {
        if let Err(e) = task.await {
            error!(?e, task = name, "task ended abnormally");
        }
    }
    // The poll loop releases on exit; repeat in case it panicked
    engine.shutdown();
    let _ = observer.await;

    info!("peak-aim-daemon stopped");

    Ok(())
}

#[cfg(target_os = "macos")]
fn platform_backend() -> Result<Arc<dyn InputBackend>, InputError> {
    Ok(Arc::new(input::CoreGraphicsBackend::new()?))
}

#[cfg(not(target_os = "macos"))]
fn platform_backend() -> Result<Arc<dyn InputBackend>, InputError> {
    Err(InputError::Unavailable(format!(
        "key injection is not supported on {}",
        std::env::consts::OS
    )))
}

/// Apply the parts of a changed settings file that take effect live
///
/// `live` tracks what the engine currently runs with.
fn reload_settings(config: &Config, live: &mut Settings, engine: &Engine) {
    let reloaded = match config.reload() {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "failed to reload settings, keeping current ones");
            return;
        }
    };

    for field in live.restart_required(&reloaded) {
        warn!(field, "setting changed but only applies after a restart");
    }

    let merged = match live.with_live_fields(&reloaded) {
        Ok(merged) => merged,
        Err(e) => {
            warn!(error = %e, "reloaded settings rejected, keeping current ones");
            return;
        }
    };
    if merged == *live {
        info!("no live settings changed");
        return;
    }

    match engine.apply_settings(&merged) {
        Ok(()) => {
            info!(
                output_key = %merged.output_key,
                tap_threshold_ms = merged.tap_threshold_ms,
                "settings reloaded"
            );
            *live = merged;
        }
        Err(e) => warn!(error = %e, "reloaded output key rejected, binding unchanged"),
    }
}

/// Log engine events and render the status line whenever it changes
async fn observe(
    mut event_rx: broadcast::Receiver<EngineEvent>,
    mut status_rx: watch::Receiver<StatusSnapshot>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Ok(event) => info!(%event, "engine event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "engine event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                info!(%status, "status");
            }
            _ = stop.recv() => break,
        }
    }
}
