//! # drawer-settings
//!
//! Configuration for the notification drawer engine, loaded from three
//! layers (in priority order):
//! 1. **Compiled defaults**: [`DrawerSettings::default()`]
//! 2. **User file**: `~/.drawer/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `DRAWER_*` overrides (highest priority)
//!
//! Settings are plain values: the engine takes a [`DrawerSettings`] at
//! construction and accepts replacements at runtime.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
