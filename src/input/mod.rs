//! Input module: key state sampling, key injection and the global
//! mouse/hotkey listener
//!
//! The core only talks to the [`InputBackend`] trait. The macOS
//! implementation uses CoreGraphics; tests use a recording fake.

mod keys;
#[cfg(target_os = "macos")]
mod listener;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(test)]
pub mod fake;

use std::time::Instant;

pub use keys::{Key, TriggerKeys, TriggerState};
#[cfg(target_os = "macos")]
pub use listener::{InputListener, ListenerError};
#[cfg(target_os = "macos")]
pub use macos::CoreGraphicsBackend;

/// Source of physical key state and sink for synthetic key events
///
/// Implementations must not block: `press` and `release` either post the
/// event or fail immediately.
pub trait InputBackend: Send + Sync {
    /// Whether `key` is physically held right now
    fn is_pressed(&self, key: Key) -> Result<bool, InputError>;

    /// Inject a key-down for `key`
    fn press(&self, key: Key) -> Result<(), InputError>;

    /// Inject a key-up for `key`
    fn release(&self, key: Key) -> Result<(), InputError>;

    /// Physical right mouse button state, if the backend can report it
    fn is_right_button_pressed(&self) -> Option<bool> {
        None
    }
}

/// Errors from the input backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("failed to create event source")]
    EventSource,

    #[error("failed to create keyboard event for '{0}'")]
    EventCreation(Key),

    #[error("input backend unavailable: {0}")]
    Unavailable(String),
}

/// A single right mouse button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub pressed: bool,
    pub at: Instant,
}

/// Events delivered by the listener thread to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Right mouse button pressed or released
    Mouse(MouseEvent),
    /// The enable/disable hotkey was pressed
    TogglePressed,
    /// Event tap was disabled by the OS; events may have been missed
    TapDisabled,
}
