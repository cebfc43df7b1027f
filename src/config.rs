//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::input::{Key, TriggerKeys};

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "PEAK_AIM_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the JSON settings file
    pub config_path: PathBuf,

    /// Engine settings read from `config_path`
    pub settings: Settings,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("peak-aim");

        let config_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("config.json"));

        Ok(Self::from_paths(data_dir, config_path)?)
    }

    /// Build a configuration from explicit paths
    pub fn from_paths(data_dir: PathBuf, config_path: PathBuf) -> Result<Self, ConfigError> {
        let settings = Settings::load_from(&config_path)?;
        Ok(Self {
            data_dir,
            config_path,
            settings,
        })
    }

    /// Re-read the settings file
    pub fn reload(&self) -> Result<Settings, ConfigError> {
        Settings::load_from(&self.config_path)
    }
}

/// Tunable engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The two keys whose hold drives the remap
    pub trigger_keys: [Key; 2],
    /// Key pressed on the user's behalf
    pub output_key: Key,
    /// Global hotkey flipping the enabled flag
    pub toggle_hotkey: Key,
    /// Right-clicks shorter than this toggle the scope
    pub tap_threshold_ms: u64,
    /// A toggled scope closes after this long without right-click activity
    pub scope_timeout_s: u64,
    pub poll_hz_active: u32,
    pub poll_hz_idle: u32,
    pub watchdog_interval_s: u64,
    /// Holding a trigger key also refreshes the scope inactivity timer
    pub triggers_refresh_scope: bool,
    pub start_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger_keys: [Key::Q, Key::E],
            output_key: Key::O,
            toggle_hotkey: Key::F8,
            tap_threshold_ms: 300,
            scope_timeout_s: 30,
            poll_hz_active: 20,
            poll_hz_idle: 5,
            watchdog_interval_s: 2,
            triggers_refresh_scope: false,
            start_enabled: false,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.poll_hz_active == 0 || self.poll_hz_idle == 0 {
            return invalid("poll rates must be above zero".into());
        }
        if self.tap_threshold_ms == 0 {
            return invalid("tap_threshold_ms must be above zero".into());
        }
        if self.scope_timeout_s == 0 || self.watchdog_interval_s == 0 {
            return invalid("scope_timeout_s and watchdog_interval_s must be above zero".into());
        }

        let triggers = self.triggers();
        if triggers.a == triggers.b {
            return invalid(format!("trigger keys must differ, both are '{}'", triggers.a));
        }
        if triggers.contains(self.output_key) {
            return invalid(format!("output key '{}' is also a trigger key", self.output_key));
        }
        if triggers.contains(self.toggle_hotkey) || self.toggle_hotkey == self.output_key {
            return invalid(format!(
                "toggle hotkey '{}' collides with a remapped key",
                self.toggle_hotkey
            ));
        }
        Ok(())
    }

    /// Names of fields changed in `reloaded` that only apply at startup
    pub fn restart_required(&self, reloaded: &Settings) -> Vec<&'static str> {
        let changed = [
            ("trigger_keys", self.trigger_keys != reloaded.trigger_keys),
            ("toggle_hotkey", self.toggle_hotkey != reloaded.toggle_hotkey),
            ("scope_timeout_s", self.scope_timeout_s != reloaded.scope_timeout_s),
            ("poll_hz_active", self.poll_hz_active != reloaded.poll_hz_active),
            ("poll_hz_idle", self.poll_hz_idle != reloaded.poll_hz_idle),
            (
                "watchdog_interval_s",
                self.watchdog_interval_s != reloaded.watchdog_interval_s,
            ),
            (
                "triggers_refresh_scope",
                self.triggers_refresh_scope != reloaded.triggers_refresh_scope,
            ),
            ("start_enabled", self.start_enabled != reloaded.start_enabled),
        ];
        changed
            .into_iter()
            .filter_map(|(name, differs)| differs.then_some(name))
            .collect()
    }

    /// These settings with the live-reloadable fields taken from `reloaded`
    ///
    /// Validated against the running trigger keys and hotkey, not the
    /// reloaded ones.
    pub fn with_live_fields(&self, reloaded: &Settings) -> Result<Settings, ConfigError> {
        let merged = Settings {
            output_key: reloaded.output_key,
            tap_threshold_ms: reloaded.tap_threshold_ms,
            ..self.clone()
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn triggers(&self) -> TriggerKeys {
        TriggerKeys {
            a: self.trigger_keys[0],
            b: self.trigger_keys[1],
        }
    }

    pub fn tap_threshold(&self) -> Duration {
        Duration::from_millis(self.tap_threshold_ms)
    }

    pub fn scope_timeout(&self) -> Duration {
        Duration::from_secs(self.scope_timeout_s)
    }

    /// Tick period while enabled
    pub fn active_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.poll_hz_active))
    }

    /// Tick period while disabled
    pub fn idle_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.poll_hz_idle))
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_s)
    }
}

/// Errors loading or validating settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(String),
}
