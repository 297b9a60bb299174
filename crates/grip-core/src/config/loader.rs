//! Loads `GripConfig` from a single JSON file plus `GRIP_`-prefixed,
//! double-underscore-nested environment variable overrides, and saves
//! it back with an atomic temp-file-then-rename write.

use super::schema::GripConfig;
use crate::error::{GripError, GripResult};
use log::warn;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "GRIP_";
pub const ENV_NESTED_DELIMITER: &str = "__";

pub fn default_config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".grip").join("config.json")
}

/// Load config from `path` (or the default `~/.grip/config.json`),
/// applying environment variable overrides on top. A missing file is
/// not an error — it yields the all-defaults configuration.
pub fn load_config(path: Option<&Path>) -> GripResult<GripConfig> {
    let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    let mut root: Value = if path.exists() {
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Config file {} is not valid JSON ({e}); using defaults", path.display());
            Value::Object(serde_json::Map::new())
        })
    } else {
        Value::Object(serde_json::Map::new())
    };

    apply_env_overrides(&mut root, std::env::vars());

    let config: GripConfig = serde_json::from_value(root).map_err(|e| {
        GripError::Config(format!("failed to parse merged configuration: {e}"))
    })?;
    Ok(config)
}

/// Atomically write `config` to `path` (or the default path).
pub fn save_config(config: &GripConfig, path: Option<&Path>) -> GripResult<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Apply `GRIP_SECTION__KEY__...` style overrides onto a JSON value
/// tree in place. Segments are lowercased to match the schema's
/// snake_case field names. Values are parsed as JSON when possible
/// (so `GRIP_GATEWAY__PORT=9000` becomes a number), falling back to a
/// plain string otherwise.
fn apply_env_overrides(root: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else { continue };
        let segments: Vec<String> =
            rest.split(ENV_NESTED_DELIMITER).map(|s| s.to_lowercase()).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            continue;
        }
        set_nested(root, &segments, parse_env_value(&value));
    }
}

fn parse_env_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested(root: &mut Value, path: &[String], value: Value) {
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    let obj = root.as_object_mut().expect("just ensured object");

    if path.len() == 1 {
        obj.insert(path[0].clone(), value);
        return;
    }

    let child = obj.entry(path[0].clone()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_nested(child, &path[1..], value);
}

#[allow(dead_code)]
fn collect_env_with_prefix() -> HashMap<String, String> {
    std::env::vars().filter(|(k, _)| k.starts_with(ENV_PREFIX)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_sets_nested_scalar() {
        let mut root = Value::Object(serde_json::Map::new());
        apply_env_overrides(
            &mut root,
            vec![("GRIP_GATEWAY__PORT".to_string(), "9000".to_string())].into_iter(),
        );
        assert_eq!(root["gateway"]["port"], Value::Number(9000.into()));
    }

    #[test]
    fn env_override_sets_deeply_nested_string() {
        let mut root = Value::Object(serde_json::Map::new());
        apply_env_overrides(
            &mut root,
            vec![(
                "GRIP_AGENTS__DEFAULTS__MODEL".to_string(),
                "anthropic/claude-sonnet-4".to_string(),
            )]
            .into_iter(),
        );
        assert_eq!(root["agents"]["defaults"]["model"], "anthropic/claude-sonnet-4");
    }

    #[test]
    fn non_grip_vars_are_ignored() {
        let mut root = Value::Object(serde_json::Map::new());
        apply_env_overrides(&mut root, vec![("PATH".to_string(), "/bin".to_string())].into_iter());
        assert_eq!(root, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/path/config.json"))).unwrap();
        assert_eq!(config.gateway.port, 8420);
    }
}
