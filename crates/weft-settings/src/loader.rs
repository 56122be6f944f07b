//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WeftSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `WEFT_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use weft_logging::LogFormat;

use crate::errors::Result;
use crate::types::{LogLevel, WeftSettings};

/// Resolve the path to the settings file (`~/.weft/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".weft").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WeftSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values
/// are errors.
pub fn load_settings_from_path(path: &Path) -> Result<WeftSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<WeftSettings> {
    let defaults = serde_json::to_value(WeftSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WeftSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `WEFT_*` environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut WeftSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut WeftSettings, env: impl Fn(&str) -> Option<String>) {
    let reader = EnvReader { env };

    if let Some(v) = reader.string("WEFT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = reader.parsed("WEFT_PORT", |s| parse_u16_range(s, 0, u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = reader.parsed("WEFT_SEND_QUEUE_CAPACITY", |s| {
        parse_usize_range(s, 1, 1_048_576)
    }) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = reader.parsed("WEFT_MAX_MESSAGE_SIZE", |s| {
        parse_usize_range(s, 64, 256 * 1024 * 1024)
    }) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = reader.parsed("WEFT_HANDLER_TIMEOUT_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.server.handler_timeout_ms = v;
    }
    if let Some(v) = reader.parsed("WEFT_MAX_CONNECTIONS", |s| parse_usize_range(s, 1, 1_000_000)) {
        settings.server.max_connections = v;
    }
    if let Some(v) = reader.parsed("WEFT_TICK_INTERVAL_SECS", |s| parse_u64_range(s, 0, 86_400)) {
        settings.server.tick_interval_secs = v;
    }
    if let Some(v) = reader.parsed("WEFT_LOG_LEVEL", LogLevel::parse) {
        settings.logging.level = v;
    }
    if let Some(v) = reader.parsed("WEFT_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var reader ──────────────────────────────────────────────────────────

struct EnvReader<F> {
    env: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
