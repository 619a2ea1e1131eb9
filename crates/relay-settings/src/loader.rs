//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If a settings file is given and exists, deep-merge its values over defaults
//! 3. Apply `RELAY_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RelaySettings;

/// Accepted values for `logging.format`.
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Load settings from an optional file with process environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Load settings from an optional file, reading overrides through `env`.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_with_env(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RelaySettings> {
    let schema = |source| SettingsError::Schema {
        path: path.map(Path::to_path_buf),
        source,
    };
    let defaults = serde_json::to_value(RelaySettings::default()).map_err(schema)?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let user: Value =
                serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: RelaySettings = serde_json::from_value(merged).map_err(schema)?;
    apply_env_overrides(&mut settings, env);
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

/// Apply `RELAY_*` overrides.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_env_overrides(settings: &mut RelaySettings, env: impl Fn(&str) -> Option<String>) {
    let string = |key: &str| env(key).filter(|v| !v.is_empty());

    if let Some(v) = string("RELAY_BIND") {
        settings.server.bind = v;
    }
    if let Some(v) = string("RELAY_SEND_QUEUE") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.send_queue_capacity = n,
            None => warn!(key = "RELAY_SEND_QUEUE", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = string("RELAY_SEND_TIMEOUT_MS") {
        match parse_u64_range(&v, 1, 600_000) {
            Some(n) => settings.server.send_timeout_ms = n,
            None => warn!(key = "RELAY_SEND_TIMEOUT_MS", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = string("RELAY_MAX_CONNECTIONS") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.server.max_connections = n,
            None => warn!(key = "RELAY_MAX_CONNECTIONS", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("RELAY_LOG_FORMAT") {
        let lower = v.to_lowercase();
        if LOG_FORMATS.contains(&lower.as_str()) {
            settings.logging.format = lower;
        } else {
            warn!(key = "RELAY_LOG_FORMAT", value = %v, "invalid env var, ignoring");
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn no_path_yields_defaults() {
        let s = load_settings_with_env(None, no_env).unwrap();
        assert_eq!(s, RelaySettings::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let s = load_settings_with_env(Some(&path), no_env).unwrap();
        assert_eq!(s, RelaySettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let file = write_settings(r#"{"server":{"bind":"ws://0.0.0.0:9000/chat","maxConnections":8}}"#);
        let s = load_settings_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(s.server.bind, "ws://0.0.0.0:9000/chat");
        assert_eq!(s.server.max_connections, 8);
        assert_eq!(s.server.send_queue_capacity, 256);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_error() {
        let file = write_settings("{not json");
        let err = load_settings_with_env(Some(file.path()), no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert_eq!(err.path(), Some(file.path()));
    }

    #[test]
    fn wrong_type_in_file_is_schema_error() {
        let file = write_settings(r#"{"server":{"maxConnections":"many"}}"#);
        let err = load_settings_with_env(Some(file.path()), no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Schema { .. }));
        assert_eq!(err.path(), Some(file.path()));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn directory_as_settings_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_with_env(Some(dir.path()), no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
        assert_eq!(err.path(), Some(dir.path()));
    }

    #[test]
    fn null_in_file_keeps_default() {
        let file = write_settings(r#"{"server":{"bind":null}}"#);
        let s = load_settings_with_env(Some(file.path()), no_env).unwrap();
        assert_eq!(s.server.bind, "http://localhost:8080/");
    }

    #[test]
    fn env_overrides_file() {
        let file = write_settings(r#"{"server":{"bind":"127.0.0.1:1"}}"#);
        let env = env_from(&[("RELAY_BIND", "127.0.0.1:2"), ("RELAY_SEND_QUEUE", "16")]);
        let s = load_settings_with_env(Some(file.path()), env).unwrap();
        assert_eq!(s.server.bind, "127.0.0.1:2");
        assert_eq!(s.server.send_queue_capacity, 16);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let mut s = RelaySettings::default();
        let env = env_from(&[
            ("RELAY_SEND_QUEUE", "0"),
            ("RELAY_SEND_TIMEOUT_MS", "abc"),
            ("RELAY_MAX_CONNECTIONS", "-3"),
            ("RELAY_LOG_FORMAT", "xml"),
        ]);
        apply_env_overrides(&mut s, env);
        assert_eq!(s, RelaySettings::default());
    }

    #[test]
    fn empty_env_value_ignored() {
        let mut s = RelaySettings::default();
        apply_env_overrides(&mut s, env_from(&[("RELAY_BIND", "")]));
        assert_eq!(s.server.bind, "http://localhost:8080/");
    }

    #[test]
    fn log_env_overrides() {
        let mut s = RelaySettings::default();
        let env = env_from(&[("RELAY_LOG_LEVEL", "debug"), ("RELAY_LOG_FORMAT", "JSON")]);
        apply_env_overrides(&mut s, env);
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.format, "json");
    }

    #[test]
    fn deep_merge_nested_objects() {
        let a = serde_json::json!({"server": {"bind": "a", "maxConnections": 1}});
        let b = serde_json::json!({"server": {"bind": "b"}});
        let merged = deep_merge(a, b);
        assert_eq!(merged["server"]["bind"], "b");
        assert_eq!(merged["server"]["maxConnections"], 1);
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let merged = deep_merge(serde_json::json!({"x": [1, 2]}), serde_json::json!({"x": [3]}));
        assert_eq!(merged["x"], serde_json::json!([3]));
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_u64_range("10", 1, 100), Some(10));
        assert_eq!(parse_u64_range(" 10 ", 1, 100), Some(10));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u64_range("101", 1, 100), None);
        assert_eq!(parse_usize_range("x", 1, 100), None);
    }
}
