//! Events module: status snapshots and discrete engine events
//!
//! Status snapshots are published once per tick through a [`StatusSink`];
//! discrete transitions are broadcast as [`EngineEvent`]s. Both are pure
//! observations and never feed back into the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::input::Key;

/// Published after every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Remapping is enabled
    pub active: bool,
    /// Scope is open (remap suppressed)
    pub scope_open: bool,
    /// Key injection keeps failing
    #[serde(default)]
    pub degraded: bool,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.active { "ACTIVE" } else { "INACTIVE" };
        let scope = if self.scope_open { "OPEN" } else { "CLOSED" };
        write!(f, "● {} | Scope: {}", status, scope)?;
        if self.degraded {
            write!(f, " | INPUT ERROR")?;
        }
        Ok(())
    }
}

/// Receiver of per-tick status snapshots
pub trait StatusSink: Send + Sync {
    fn on_status(&self, snapshot: StatusSnapshot);
}

/// Watch channel sink: observers only wake when the snapshot changes
impl StatusSink for watch::Sender<StatusSnapshot> {
    fn on_status(&self, snapshot: StatusSnapshot) {
        self.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Discrete transitions emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Remapping switched on or off
    EnabledChanged { enabled: bool },

    /// Output key pressed
    OutputPressed { key: Key },

    /// Output key released
    OutputReleased {
        key: Key,
        /// How long the key was held in milliseconds
        held_ms: u64,
    },

    /// Scope toggled by a right-click tap
    ScopeToggled { open: bool },

    /// Toggled scope closed after inactivity
    ScopeTimedOut,

    /// Watchdog released a key no trigger was holding
    WatchdogCorrected { key: Key },

    /// Output key changed
    OutputRebound { from: Key, to: Key },

    /// Key injection failed repeatedly
    InjectionDegraded { failures: u32 },

    /// Key injection succeeded again after being degraded
    InjectionRecovered,
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::EnabledChanged { enabled } => {
                write!(f, "{}", if *enabled { "ENABLED" } else { "DISABLED" })
            }
            EngineEvent::OutputPressed { key } => write!(f, "OUTPUT_PRESSED ({})", key),
            EngineEvent::OutputReleased { key, held_ms } => {
                write!(f, "OUTPUT_RELEASED ({}, {}ms)", key, held_ms)
            }
            EngineEvent::ScopeToggled { open } => {
                write!(f, "SCOPE_{}", if *open { "OPENED" } else { "CLOSED" })
            }
            EngineEvent::ScopeTimedOut => write!(f, "SCOPE_TIMED_OUT"),
            EngineEvent::WatchdogCorrected { key } => write!(f, "WATCHDOG_CORRECTED ({})", key),
            EngineEvent::OutputRebound { from, to } => {
                write!(f, "OUTPUT_REBOUND ({} -> {})", from, to)
            }
            EngineEvent::InjectionDegraded { failures } => {
                write!(f, "INJECTION_DEGRADED ({} failures)", failures)
            }
            EngineEvent::InjectionRecovered => write!(f, "INJECTION_RECOVERED"),
        }
    }
}
