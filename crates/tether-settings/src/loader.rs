//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If `~/.tether/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::TetherSettings;

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). Invalid
/// JSON or a combination of values that fails validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply environment variable overrides to loaded settings.
///
/// Integers must parse and fall within range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Invalid values are
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("TETHER_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Liveness ────────────────────────────────────────────────────
    let liveness = &mut settings.liveness;
    if let Some(v) = read_env_u64("TETHER_PONG_WAIT_MS", 1, 86_400_000) {
        liveness.pong_wait_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_PING_PERIOD_MS", 1, 86_400_000) {
        liveness.ping_period_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_WRITE_WAIT_MS", 1, 86_400_000) {
        liveness.write_wait_ms = v;
    }
    if let Some(v) = read_env_usize("TETHER_READ_LIMIT", 1, 1_073_741_824) {
        liveness.read_limit_bytes = v;
    }
    if let Some(v) = read_env_u64("TETHER_ECHO_DELAY_MIN_MS", 0, 3_600_000) {
        liveness.echo_delay_min_ms = v;
    }
    if let Some(v) = read_env_u64("TETHER_ECHO_DELAY_MAX_MS", 0, 3_600_000) {
        liveness.echo_delay_max_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("TETHER_LOG_JSON") {
        settings.logging.json = v;
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "liveness": {"pongWaitMs": 60000, "pingPeriodMs": 50000}
        });
        let source = serde_json::json!({
            "liveness": {"pongWaitMs": 30000}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["liveness"]["pongWaitMs"], 30000);
        assert_eq!(merged["liveness"]["pingPeriodMs"], 50000);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let settings = merge_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.liveness, crate::LivenessSettings::default());
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "liveness": {"echoDelayMaxMs": 100}}"#,
        )
        .unwrap();

        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.liveness.echo_delay_max_ms, 100);
        assert_eq!(settings.liveness.pong_wait_ms, 60_000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = merge_file(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn wrong_type_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"liveness": {"pongWaitMs": "soon"}}"#).unwrap();

        assert!(merge_file(&path).is_err());
    }

    #[test]
    fn invalid_combination_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"liveness": {"pongWaitMs": 1000, "pingPeriodMs": 2000}}"#,
        )
        .unwrap();

        let settings = merge_file(&path).unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { key: "pingPeriodMs", .. }));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u16_respects_range() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("port", 1, 65535), None);
    }

    #[test]
    fn parse_u64_respects_range() {
        assert_eq!(parse_u64_range("60000", 1, 86_400_000), Some(60_000));
        assert_eq!(parse_u64_range("0", 1, 10), None);
        assert_eq!(parse_u64_range("-5", 0, 10), None);
    }

    #[test]
    fn parse_usize_respects_range() {
        assert_eq!(parse_usize_range("65536", 1, 1 << 30), Some(65_536));
        assert_eq!(parse_usize_range("0", 1, 10), None);
    }

    #[test]
    fn settings_path_ends_with_expected_file() {
        let path = settings_path();
        assert!(path.ends_with(".tether/settings.json"));
    }
}
