//! Settings loading: defaults, then `~/.drawer/settings.json` merged over
//! them, then `DRAWER_*` environment overrides, then validation.

use std::path::{Path, PathBuf};

use serde_json::Value;
use serde_json::map::Entry;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{DrawerSettings, MAX_QUIET_PERIOD_MS, MIN_QUIET_PERIOD_MS, PersistenceBackend};

/// Base directory for drawer state (`~/.drawer`).
pub fn drawer_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".drawer")
}

/// Resolve the path to the settings file (`~/.drawer/settings.json`).
pub fn settings_path() -> PathBuf {
    drawer_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DrawerSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file means defaults. Invalid JSON or values that fail
/// validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<DrawerSettings> {
    let mut merged = serde_json::to_value(DrawerSettings::default())?;

    if path.exists() {
        debug!(?path, "loading settings from file");
        let user: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        deep_merge(&mut merged, user);
    } else {
        debug!(?path, "settings file not found, using defaults");
    }

    let mut settings: DrawerSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `source` into `target`: objects key by key, anything else replaced.
/// A `null` in the user file keeps the default.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                if value.is_null() {
                    continue;
                }
                match target_map.entry(key) {
                    Entry::Occupied(mut slot) => deep_merge(slot.get_mut(), value),
                    Entry::Vacant(slot) => {
                        let _ = slot.insert(value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

// ── Environment overrides ───────────────────────────────────────────────────

type ApplyOverride = fn(&mut DrawerSettings, &str) -> std::result::Result<(), &'static str>;

/// Every `DRAWER_*` variable and how it lands in the settings.
const ENV_OVERRIDES: &[(&str, ApplyOverride)] = &[
    ("DRAWER_NOTIFICATIONS_ENABLED", |s, v| {
        s.notifications_enabled = parse_bool(v)?;
        Ok(())
    }),
    ("DRAWER_COMPLETE_FORMAT", |s, v| {
        s.complete_format = parse_bool(v)?;
        Ok(())
    }),
    ("DRAWER_HIDE_INVITES", |s, v| {
        s.hide_invites = parse_bool(v)?;
        Ok(())
    }),
    ("DRAWER_QUIET_PERIOD_MS", |s, v| {
        s.scheduler.quiet_period_ms = parse_quiet_period(v)?;
        Ok(())
    }),
    ("DRAWER_PERSISTENCE_BACKEND", |s, v| {
        s.persistence.backend = parse_backend(v)?;
        Ok(())
    }),
    ("DRAWER_PERSISTENCE_PATH", |s, v| {
        s.persistence.path = v.to_string();
        Ok(())
    }),
    ("DRAWER_LOG_LEVEL", |s, v| {
        s.log_level = v.to_string();
        Ok(())
    }),
];

/// Apply `DRAWER_*` environment overrides. Invalid values are logged and
/// ignored, keeping the file or default value.
pub fn apply_env_overrides(settings: &mut DrawerSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

fn apply_overrides(settings: &mut DrawerSettings, lookup: impl Fn(&str) -> Option<String>) {
    for &(key, apply) in ENV_OVERRIDES {
        let Some(value) = lookup(key).filter(|v| !v.is_empty()) else {
            continue;
        };
        match apply(settings, &value) {
            Ok(()) => debug!(key, "environment override applied"),
            Err(reason) => warn!(key, value = %value, reason, "ignoring environment override"),
        }
    }
}

fn parse_bool(val: &str) -> std::result::Result<bool, &'static str> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean"),
    }
}

fn parse_quiet_period(val: &str) -> std::result::Result<u64, &'static str> {
    let ms: u64 = val.parse().map_err(|_| "expected milliseconds")?;
    if (MIN_QUIET_PERIOD_MS..=MAX_QUIET_PERIOD_MS).contains(&ms) {
        Ok(ms)
    } else {
        Err("quiet period out of range")
    }
}

fn parse_backend(val: &str) -> std::result::Result<PersistenceBackend, &'static str> {
    serde_json::from_value(Value::String(val.to_lowercase()))
        .map_err(|_| "expected file, sqlite or memory")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
