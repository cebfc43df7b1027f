//! Hold engine: reconciles trigger keys, scope state and the output key
//!
//! Scope and actuator state share a single mutex. Input callbacks, the
//! poll loop, the watchdog, rebinds and shutdown all serialize on it, so
//! at most one press or release is ever in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::events::{EngineEvent, StatusSink, StatusSnapshot};
use crate::input::{
    InputBackend, InputError, InputEvent, Key, MouseEvent, TriggerKeys, TriggerState,
};

use super::actuator::{ApplyResult, KeyActuator, Transition};
use super::policy;
use super::scope::{ReleaseOutcome, ScopeTracker};

/// Consecutive injection failures before the engine reports itself degraded
pub const DEGRADED_AFTER: u32 = 8;

/// Errors that abort a single tick
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to sample trigger keys: {0}")]
    Sample(#[from] InputError),

    #[error("engine is stopped")]
    Stopped,
}

/// Rejected output key changes; the current binding is left untouched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RebindError {
    #[error("'{0}' is a trigger key and cannot be the output key")]
    TriggerKey(Key),
}

/// State guarded by the engine lock
struct Core {
    /// Right-click scope state
    scope: ScopeTracker,
    /// Owner of the output key and its held flag
    actuator: KeyActuator,
    /// Set once injection has failed `DEGRADED_AFTER` times in a row
    degraded: bool,
    /// Latched by shutdown; no tick runs afterwards
    stopped: bool,
}

/// Drives the output key from trigger and scope state
pub struct Engine {
    /// Key state queries and synthetic key events
    backend: Arc<dyn InputBackend>,
    /// Everything a press or release decision reads or writes
    core: Mutex<Core>,
    /// Remapping on or off, flipped by the toggle hotkey
    enabled: AtomicBool,
    /// Keys sampled every tick
    triggers: TriggerKeys,
    /// Whether a held trigger keeps a toggled scope alive
    triggers_refresh_scope: bool,
    /// Receives a snapshot after every tick
    status: Box<dyn StatusSink>,
    /// Channel for emitting engine events
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        backend: Arc<dyn InputBackend>,
        settings: &Settings,
        status: Box<dyn StatusSink>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            backend,
            core: Mutex::new(Core {
                scope: ScopeTracker::new(settings.tap_threshold(), settings.scope_timeout()),
                actuator: KeyActuator::new(settings.output_key),
                degraded: false,
                stopped: false,
            }),
            enabled: AtomicBool::new(settings.start_enabled),
            triggers: settings.triggers(),
            triggers_refresh_scope: settings.triggers_refresh_scope,
            status,
            event_tx,
        }
    }

    /// A panic while holding the lock must not wedge the release path
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            info!(enabled, "remapping toggled");
            self.emit(EngineEvent::EnabledChanged { enabled });
        }
    }

    /// Flip the enabled flag, returning the new value
    pub fn toggle(&self) -> bool {
        let enabled = !self.enabled.fetch_xor(true, Ordering::SeqCst);
        info!(enabled, "remapping toggled");
        self.emit(EngineEvent::EnabledChanged { enabled });
        enabled
    }

    #[cfg(test)]
    pub fn is_held(&self) -> bool {
        self.lock().actuator.is_held()
    }

    #[cfg(test)]
    pub fn output_key(&self) -> Key {
        self.lock().actuator.output_key()
    }

    #[cfg(test)]
    pub fn scope_active(&self) -> bool {
        self.lock().scope.is_active()
    }

    /// Dispatch an event from the input listener
    pub fn handle_input(&self, event: InputEvent) {
        match event {
            InputEvent::Mouse(mouse) => self.handle_mouse(mouse),
            InputEvent::TogglePressed => {
                self.toggle();
            }
            InputEvent::TapDisabled => {
                warn!("input tap was disabled, mouse events may have been missed");
            }
        }
    }

    fn handle_mouse(&self, event: MouseEvent) {
        let mut core = self.lock();
        let outcome = if event.pressed {
            core.scope.press(event.at);
            None
        } else {
            Some(core.scope.release(event.at))
        };
        drop(core);

        if let Some(ReleaseOutcome::Toggled(open)) = outcome {
            info!(open, "scope toggled");
            self.emit(EngineEvent::ScopeToggled { open });
        }
    }

    /// Run one reconciliation step at `now`
    pub fn tick(&self, now: Instant) -> Result<StatusSnapshot, EngineError> {
        let mut core = self.lock();
        if core.stopped {
            return Err(EngineError::Stopped);
        }

        if core.scope.check_timeout(now) {
            info!("scope closed after inactivity");
            self.emit(EngineEvent::ScopeTimedOut);
        }

        if let Some(down) = self.backend.is_right_button_pressed() {
            if core.scope.reconcile_button(down) {
                debug!("right button is up but no release was seen, clearing hold");
            }
        }

        let snapshot = if !self.is_enabled() {
            let key = core.actuator.output_key();
            let result = core.actuator.force_release(self.backend.as_ref());
            self.record(&mut core, key, result);
            StatusSnapshot {
                active: false,
                scope_open: core.scope.toggled(),
                degraded: core.degraded,
            }
        } else {
            let triggers = self.sample_triggers()?;
            if self.triggers_refresh_scope && triggers.any() {
                core.scope.touch(now);
            }

            let hold = policy::should_hold(triggers, core.scope.is_active());
            let key = core.actuator.output_key();
            let result = core.actuator.apply(self.backend.as_ref(), hold);
            self.record(&mut core, key, result);
            StatusSnapshot {
                active: true,
                scope_open: core.scope.is_active(),
                degraded: core.degraded,
            }
        };
        drop(core);

        self.status.on_status(snapshot);
        Ok(snapshot)
    }

    /// Release the output key after a failed tick
    pub fn recover(&self) {
        let mut core = self.lock();
        if core.actuator.is_held() {
            warn!("forcing release after tick failure");
            let key = core.actuator.output_key();
            let result = core.actuator.force_release(self.backend.as_ref());
            self.record(&mut core, key, result);
        }
    }

    /// Release the output key if no trigger is physically held
    ///
    /// Returns true when a correction was made. Never presses.
    pub fn watchdog_check(&self) -> bool {
        let mut core = self.lock();
        if core.stopped || !core.actuator.is_held() {
            return false;
        }

        let triggers = match self.sample_triggers() {
            Ok(triggers) => triggers,
            Err(e) => {
                debug!(%e, "watchdog could not sample triggers");
                return false;
            }
        };
        if triggers.any() {
            return false;
        }

        let key = core.actuator.output_key();
        info!(key = %key, "output key held without a trigger, forcing release");
        let result = core.actuator.force_release(self.backend.as_ref());
        self.record(&mut core, key, result);
        drop(core);

        self.emit(EngineEvent::WatchdogCorrected { key });
        true
    }

    /// Change the output key, releasing the old one first if held
    pub fn rebind(&self, key: Key) -> Result<(), RebindError> {
        if self.triggers.contains(key) {
            return Err(RebindError::TriggerKey(key));
        }

        let mut core = self.lock();
        let from = core.actuator.output_key();
        if from == key {
            return Ok(());
        }

        let result = core.actuator.rebind(self.backend.as_ref(), key);
        self.record(&mut core, from, result);
        drop(core);

        self.emit(EngineEvent::OutputRebound { from, to: key });
        Ok(())
    }

    /// Apply reloaded settings that can change at runtime
    pub fn apply_settings(&self, settings: &Settings) -> Result<(), RebindError> {
        self.rebind(settings.output_key)?;
        self.lock().scope.set_tap_threshold(settings.tap_threshold());
        Ok(())
    }

    /// Stop the engine, releasing the output key if held
    ///
    /// Later ticks fail with [`EngineError::Stopped`] so nothing can press
    /// the key again.
    pub fn shutdown(&self) {
        let mut core = self.lock();
        if core.stopped {
            return;
        }
        core.stopped = true;

        let key = core.actuator.output_key();
        let result = core.actuator.force_release(self.backend.as_ref());
        self.record(&mut core, key, result);
        info!("engine stopped, output key released");
    }

    fn sample_triggers(&self) -> Result<TriggerState, InputError> {
        Ok(TriggerState {
            a: self.backend.is_pressed(self.triggers.a)?,
            b: self.backend.is_pressed(self.triggers.b)?,
        })
    }

    /// Log and publish the outcome of an actuator call on `key`
    fn record(&self, core: &mut Core, key: Key, result: ApplyResult) {
        match result {
            Ok(Some(Transition::Pressed)) => self.emit(EngineEvent::OutputPressed { key }),
            Ok(Some(Transition::Released { held_ms })) => {
                self.emit(EngineEvent::OutputReleased { key, held_ms })
            }
            Ok(None) => {}
            // Already reported as degraded, keep retries quiet
            Err(e) if core.degraded => debug!(error = %e, "key injection failed"),
            Err(e) => warn!(error = %e, "key injection failed"),
        }

        let failures = core.actuator.consecutive_failures();
        if failures >= DEGRADED_AFTER && !core.degraded {
            core.degraded = true;
            error!(failures, "key injection keeps failing, check Accessibility permissions");
            self.emit(EngineEvent::InjectionDegraded { failures });
        } else if failures == 0 && core.degraded {
            core.degraded = false;
            info!("key injection recovered");
            self.emit(EngineEvent::InjectionRecovered);
        }
    }

    fn emit(&self, event: EngineEvent) {
        debug!(%event, "engine event");
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
