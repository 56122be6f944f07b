//! # weft-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WeftSettings::default()`]
//! 2. **Settings file**: `~/.weft/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `WEFT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::{LogLevel, LoggingSettings, ServerSettings, WeftSettings};
