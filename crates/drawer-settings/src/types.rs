//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. `#[serde(default)]` allows partial
//! JSON: missing fields get their default during deserialization.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the drawer engine.
///
/// ```json
/// {
///   "completeFormat": false,
///   "scheduler": { "quietPeriodMs": 500 },
///   "persistence": { "backend": "sqlite", "path": "/data/drawer.db" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrawerSettings {
    /// Device-level switch; when off, incoming records are dropped.
    pub notifications_enabled: bool,
    /// Render one notification per conversation/invitation/alert. When off,
    /// only a summary with compact, content-free wording is rendered.
    pub complete_format: bool,
    /// Drop invitation records (the host auto-accepts invitations).
    pub hide_invites: bool,
    /// Debounce settings.
    pub scheduler: SchedulerSettings,
    /// Durable state settings.
    pub persistence: PersistenceSettings,
    /// Default log level for the host's `tracing` subscriber.
    pub log_level: String,
}

impl Default for DrawerSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            complete_format: true,
            hide_invites: false,
            scheduler: SchedulerSettings::default(),
            persistence: PersistenceSettings::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl DrawerSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.quiet_period_ms < MIN_QUIET_PERIOD_MS
            || self.scheduler.quiet_period_ms > MAX_QUIET_PERIOD_MS
        {
            return Err(SettingsError::InvalidValue(format!(
                "scheduler.quietPeriodMs must be within {MIN_QUIET_PERIOD_MS}..={MAX_QUIET_PERIOD_MS}, got {}",
                self.scheduler.quiet_period_ms
            )));
        }
        if self.persistence.backend != PersistenceBackend::Memory
            && self.persistence.path.trim().is_empty()
        {
            return Err(SettingsError::InvalidValue(
                "persistence.path is required for durable backends".to_string(),
            ));
        }
        Ok(())
    }
}

/// Smallest accepted quiet period.
pub const MIN_QUIET_PERIOD_MS: u64 = 10;
/// Largest accepted quiet period.
pub const MAX_QUIET_PERIOD_MS: u64 = 10_000;

/// Debounce scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    /// Quiet period after the last refresh request before a pass runs.
    pub quiet_period_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            quiet_period_ms: 200,
        }
    }
}

/// Where the event store snapshot lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// JSON file, replaced atomically.
    #[default]
    File,
    /// Single-row `SQLite` table.
    Sqlite,
    /// In-process only; state is lost on restart.
    Memory,
}

/// Durable state settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Storage backend.
    pub backend: PersistenceBackend,
    /// Snapshot location (file path or database path).
    pub path: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::File,
            path: crate::loader::drawer_dir()
                .join("notifications.cache.json")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
