//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{Settings, StoreBackend};

/// Resolve the default settings file (`~/.chanswap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chanswap").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
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

/// Apply `CHANSWAP_*` overrides. `lookup` abstracts the environment so the
/// rules can be exercised without mutating process state.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("CHANSWAP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("CHANSWAP_PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => tracing::warn!(key = "CHANSWAP_PORT", value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read("CHANSWAP_STORE_BACKEND") {
        match v.parse::<StoreBackend>() {
            Ok(backend) => settings.store.backend = backend,
            Err(e) => tracing::warn!(key = "CHANSWAP_STORE_BACKEND", error = %e, "ignoring"),
        }
    }
    if let Some(v) = read("CHANSWAP_STORE_PATH") {
        settings.store.path = v;
    }
    if let Some(v) = read("CHANSWAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("CHANSWAP_LOG_JSON") {
        match parse_bool(&v) {
            Some(json) => settings.logging.json = json,
            None => tracing::warn!(key = "CHANSWAP_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

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

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 5000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, Settings::default().server.port);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7000}, "store": {"backend": "sqlite", "path": "items.db"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.store.path, "items.db");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("CHANSWAP_HOST", "127.0.0.1"),
                ("CHANSWAP_PORT", "6001"),
                ("CHANSWAP_STORE_BACKEND", "sqlite"),
                ("CHANSWAP_STORE_PATH", "/var/lib/chanswap.db"),
                ("CHANSWAP_LOG_LEVEL", "debug"),
                ("CHANSWAP_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 6001);
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert_eq!(settings.store.path, "/var/lib/chanswap.db");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("CHANSWAP_PORT", "99999"),
                ("CHANSWAP_STORE_BACKEND", "mongo"),
                ("CHANSWAP_LOG_JSON", "maybe"),
                ("CHANSWAP_HOST", ""),
            ]),
        );
        let defaults = Settings::default();
        assert_eq!(settings.server.port, defaults.server.port);
        assert_eq!(settings.server.host, defaults.server.host);
        assert_eq!(settings.store.backend, defaults.store.backend);
        assert!(!settings.logging.json);
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("nah"), None);
        assert_eq!(parse_u16_range("80", 1, 100), Some(80));
        assert_eq!(parse_u16_range("0", 1, 100), None);
    }
}
