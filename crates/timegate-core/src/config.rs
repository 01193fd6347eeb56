//! TOML-based engine settings.
//!
//! Tunables for the accounting windows, history retention and the runtime
//! envelope. Stored at `~/.config/timegate/config.toml`. The registry and
//! shield documents are not settings; the host writes those straight into
//! the durable store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::store::data_dir;

/// Session accounting windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Gap after which an event opens a fresh session.
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,
    /// Window inside which a regressed threshold counts as catch-up noise.
    #[serde(default = "default_rapid_fire_window")]
    pub rapid_fire_window_secs: u64,
    /// Window after a monitoring restart inside which regressed thresholds
    /// are always dropped.
    #[serde(default = "default_restart_guard")]
    pub restart_guard_secs: u64,
}

/// Ledger bookkeeping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Days of archived history to retain.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Track per-hour buckets alongside the daily total.
    #[serde(default = "default_true")]
    pub hourly_buckets: bool,
}

/// Runtime envelope settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Resident-set size above which the degraded path activates.
    #[serde(default = "default_memory_budget")]
    pub memory_budget_bytes: u64,
    /// Liveness heartbeat interval.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

/// Engine settings.
///
/// Serialized to/from TOML at `~/.config/timegate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

// Default functions
fn default_restart_window() -> u64 {
    30
}
fn default_rapid_fire_window() -> u64 {
    30
}
fn default_restart_guard() -> u64 {
    50
}
fn default_retention_days() -> u32 {
    30
}
fn default_memory_budget() -> u64 {
    5_000_000
}
fn default_heartbeat_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            restart_window_secs: default_restart_window(),
            rapid_fire_window_secs: default_rapid_fire_window(),
            restart_guard_secs: default_restart_guard(),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            hourly_buckets: true,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            memory_budget_bytes: default_memory_budget(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            ledger: LedgerSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when no file exists.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, SettingsError> {
        let path = settings_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| SettingsError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| SettingsError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Persist settings to the config file.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = settings_path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| SettingsError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| SettingsError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

fn settings_path() -> Result<PathBuf, SettingsError> {
    let dir = data_dir().map_err(|e| SettingsError::LoadFailed {
        path: PathBuf::from("~/.config/timegate"),
        message: e.to_string(),
    })?;
    Ok(dir.join("config.toml"))
}
