//! Output key actuator
//!
//! The only place synthetic key events are issued. Tracks whether the
//! output key is currently held and guarantees a press is never repeated
//! without an intervening release.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::input::{InputBackend, InputError, Key};

/// A successful change of the output key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pressed,
    Released { held_ms: u64 },
}

/// Injection failures; never fatal to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActuatorError {
    #[error("failed to press '{key}': {source}")]
    Press {
        key: Key,
        #[source]
        source: InputError,
    },

    #[error("failed to release '{key}': {source}")]
    Release {
        key: Key,
        #[source]
        source: InputError,
    },
}

pub type ApplyResult = Result<Option<Transition>, ActuatorError>;

#[derive(Debug)]
pub struct KeyActuator {
    output_key: Key,
    held: bool,
    held_since: Option<Instant>,
    consecutive_failures: u32,
}

impl KeyActuator {
    pub fn new(output_key: Key) -> Self {
        Self {
            output_key,
            held: false,
            held_since: None,
            consecutive_failures: 0,
        }
    }

    pub fn output_key(&self) -> Key {
        self.output_key
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Number of injection failures since the last successful injection
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Drive the output key towards `should_hold`
    ///
    /// Issues at most one press or release. A failed press leaves the key
    /// released so the next call retries; a failed release still clears
    /// the held flag.
    pub fn apply(&mut self, backend: &dyn InputBackend, should_hold: bool) -> ApplyResult {
        match (should_hold, self.held) {
            (true, false) => self.press(backend),
            (false, true) => self.release(backend),
            _ => Ok(None),
        }
    }

    /// Release the output key if held
    pub fn force_release(&mut self, backend: &dyn InputBackend) -> ApplyResult {
        self.apply(backend, false)
    }

    /// Switch the output key, releasing the old one first if held
    ///
    /// The binding changes even if the release fails; the returned result
    /// reports the release of the old key.
    pub fn rebind(&mut self, backend: &dyn InputBackend, new_key: Key) -> ApplyResult {
        let released = self.force_release(backend);
        info!(from = %self.output_key, to = %new_key, "output key rebound");
        self.output_key = new_key;
        released
    }

    fn press(&mut self, backend: &dyn InputBackend) -> ApplyResult {
        let key = self.output_key;
        match backend.press(key) {
            Ok(()) => {
                self.held = true;
                self.held_since = Some(Instant::now());
                self.consecutive_failures = 0;
                debug!(key = %key, "output key pressed");
                Ok(Some(Transition::Pressed))
            }
            Err(source) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Err(ActuatorError::Press { key, source })
            }
        }
    }

    fn release(&mut self, backend: &dyn InputBackend) -> ApplyResult {
        let key = self.output_key;
        let held_ms = self
            .held_since
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        // Cleared before the call so a failure can never leave the flag set
        self.held = false;

        match backend.release(key) {
            Ok(()) => {
                self.consecutive_failures = 0;
                debug!(key = %key, held_ms, "output key released");
                Ok(Some(Transition::Released { held_ms }))
            }
            Err(source) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(key = %key, %source, "release failed, treating key as released");
                Err(ActuatorError::Release { key, source })
            }
        }
    }
}
