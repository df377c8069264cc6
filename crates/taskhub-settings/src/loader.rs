//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TaskhubSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TaskhubSettings;

/// Directory holding taskhub state (`~/.taskhub`).
pub fn taskhub_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taskhub")
}

/// Resolve the path to the settings file (`~/.taskhub/settings.json`).
pub fn settings_path() -> PathBuf {
    taskhub_dir().join("settings.json")
}

/// Database file used when `database.path` is empty.
pub fn default_db_path() -> PathBuf {
    taskhub_dir().join("taskhub.db")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TaskhubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// [`TaskhubSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<TaskhubSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<TaskhubSettings> {
    let defaults = serde_json::to_value(TaskhubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TaskhubSettings = serde_json::from_value(merged)?;
    apply_env_overrides_from(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TaskhubSettings) {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`.
///
/// Invalid values are logged and ignored (the file/default value stays).
/// `TASKHUB_PORT` wins over the conventional `PORT`.
pub fn apply_env_overrides_from(
    settings: &mut TaskhubSettings,
    env: impl Fn(&str) -> Option<String>,
) {
    let read_string = |name: &str| env(name).filter(|v| !v.is_empty());
    let read_u16 = |name: &str, min: u16, max: u16| {
        let val = read_string(name)?;
        let parsed = parse_u16_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        parsed
    };
    let read_usize = |name: &str, min: usize, max: usize| {
        let val = read_string(name)?;
        let parsed = parse_usize_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        parsed
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_string("TASKHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_u16("TASKHUB_PORT", 1, 65535) {
        settings.server.port = v;
    }

    // ── WebSocket ───────────────────────────────────────────────────
    if let Some(v) = read_usize("TASKHUB_WS_QUEUE", 1, 65_536) {
        settings.websocket.send_queue_capacity = v;
    }
    if let Some(v) = read_usize("TASKHUB_WS_MAX_MESSAGE", 64, 16 * 1024 * 1024) {
        settings.websocket.max_message_size = v;
    }

    // ── Auth / storage / logging ────────────────────────────────────
    if let Some(v) = read_string("JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read_string("TASKHUB_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_string("TASKHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
