//! # safetrail-settings
//!
//! Layered configuration for the safetrail server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SafetrailSettings::default()`]
//! 2. **User file**: `~/.safetrail/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `SAFETRAIL_*` overrides (highest priority)
//!
//! There is no global instance. The binary loads settings once and passes
//! them down, and tests build their own.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
