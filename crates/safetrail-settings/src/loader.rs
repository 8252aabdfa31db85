//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SafetrailSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SAFETRAIL_*` environment variable overrides
//! 4. Check cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SafetrailSettings;

/// Resolve the default settings path (`~/.safetrail/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".safetrail").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SafetrailSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SafetrailSettings> {
    let defaults = serde_json::to_value(SafetrailSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SafetrailSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
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
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (file/default value wins).
pub fn apply_env_overrides(settings: &mut SafetrailSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SAFETRAIL_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("SAFETRAIL_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("SAFETRAIL_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_u64("SAFETRAIL_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_env_u64("SAFETRAIL_HEARTBEAT_TIMEOUT_SECS", 1, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = read_env_bool("SAFETRAIL_EXPOSE_INTERNAL_ERRORS") {
        settings.server.expose_internal_errors = v;
    }

    // ── Geofence ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SAFETRAIL_GEOFENCE_TTL_SECS", 0, 86_400) {
        settings.geofence.cache_ttl_secs = v;
    }
    if let Some(v) = read_env_string("SAFETRAIL_ZONES_FILE") {
        settings.geofence.zones_file = Some(v);
    }

    // ── Alerts ──────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SAFETRAIL_ALERT_RETENTION_HOURS", 1, 24 * 365) {
        settings.alerts.retention_hours = v;
    }
    if let Some(v) = read_env_string("SAFETRAIL_DISCONNECT_POLICY") {
        match serde_json::from_value(Value::String(v.clone())) {
            Ok(policy) => settings.alerts.disconnect_policy = policy,
            Err(_) => tracing::warn!(value = %v, "unknown disconnect policy, ignoring"),
        }
    }

    // ── Housekeeping ────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SAFETRAIL_LIVENESS_INTERVAL_SECS", 1, 3600) {
        settings.housekeeping.liveness_interval_secs = v;
    }
    if let Some(v) = read_env_u64("SAFETRAIL_RETENTION_INTERVAL_SECS", 1, 86_400) {
        settings.housekeeping.retention_interval_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SAFETRAIL_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("SAFETRAIL_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject combinations that would make the server misbehave.
pub fn validate(settings: &SafetrailSettings) -> Result<()> {
    let server = &settings.server;
    if server.send_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueue must be at least 1".into(),
        ));
    }
    if server.heartbeat_interval_secs == 0 || settings.housekeeping.liveness_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "heartbeat and liveness intervals must be at least 1 second".into(),
        ));
    }
    if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatTimeoutSecs ({}) is shorter than heartbeatIntervalSecs ({})",
            server.heartbeat_timeout_secs, server.heartbeat_interval_secs
        )));
    }
    if settings.housekeeping.retention_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "housekeeping.retentionIntervalSecs must be at least 1".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
