//! Global input listener using macOS CGEventTap
//!
//! Monitors right mouse button transitions and the enable/disable hotkey.
//! Runs on a dedicated thread with its own CFRunLoop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType, EventField,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{InputEvent, Key, MouseEvent};

/// Global listener forwarding mouse and hotkey events to the engine
pub struct InputListener {
    event_tx: mpsc::Sender<InputEvent>,
    toggle_key: Key,
    running: Arc<AtomicBool>,
}

impl InputListener {
    /// Create a new listener
    pub fn new(event_tx: mpsc::Sender<InputEvent>, toggle_key: Key) -> Self {
        Self {
            event_tx,
            toggle_key,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the listener
    ///
    /// This spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks until `stop()` is called.
    pub fn start(&self) -> Result<(), ListenerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let toggle_key = self.toggle_key;
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("input-listener".to_string())
            .spawn(move || {
                info!("input listener thread started");

                if let Err(e) = run_event_loop(event_tx, toggle_key, running.clone()) {
                    error!(?e, "input listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("input listener thread stopped");
            })
            .map_err(|e| ListenerError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    /// Stop the listener; the run loop exits within one poll interval
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the input listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("input listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to create run loop source for event tap")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Translate a tapped event into an engine event
fn classify(
    event_type: CGEventType,
    event: &CGEvent,
    toggle_key: Key,
    at: Instant,
) -> Option<InputEvent> {
    match event_type {
        CGEventType::RightMouseDown | CGEventType::RightMouseUp => {
            Some(InputEvent::Mouse(MouseEvent {
                pressed: matches!(event_type, CGEventType::RightMouseDown),
                at,
            }))
        }
        CGEventType::KeyDown => {
            let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let autorepeat =
                event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
            (code == i64::from(toggle_key.code()) && !autorepeat)
                .then_some(InputEvent::TogglePressed)
        }
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
            Some(InputEvent::TapDisabled)
        }
        _ => None,
    }
}

/// Run the CFRunLoop with the event tap
fn run_event_loop(
    event_tx: mpsc::Sender<InputEvent>,
    toggle_key: Key,
    running: Arc<AtomicBool>,
) -> Result<(), ListenerError> {
    let (callback_tx, callback_rx) = std::sync::mpsc::channel::<InputEvent>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        if let Some(input) = classify(event_type, event, toggle_key, Instant::now()) {
            let _ = callback_tx.send(input);
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::RightMouseDown,
            CGEventType::RightMouseUp,
            CGEventType::KeyDown,
        ],
        callback,
    )
    .map_err(|_| {
        error!("failed to create event tap - is Accessibility permission granted?");
        ListenerError::EventTapCreation
    })?;

    tap.enable();

    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| ListenerError::RunLoopSource)?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!(toggle_key = %toggle_key, "event tap created and enabled");

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }

        while let Ok(input) = callback_rx.try_recv() {
            if input == InputEvent::TapDisabled {
                warn!("event tap disabled by the system, re-enabling");
                tap.enable();
            }

            debug!(?input, "input event");
            // Not in an async context here
            if event_tx.blocking_send(input).is_err() {
                warn!("failed to forward input event - channel closed?");
                return Ok(());
            }
        }
    }

    Ok(())
}
