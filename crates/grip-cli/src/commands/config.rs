use clap::Subcommand;
use grip_core::config::{default_config_path, load_config};
use serde_json::Value;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration, with secrets masked.
    Show,
    /// Set a dotted config key (e.g. `gateway.port`) to a value.
    Set { key: String, value: String },
}

/// Secret-ish field names masked when displaying config, since
/// `GripConfig::Serialize` writes raw secret values (they persist to
/// disk as plain strings, per the external-interface contract).
const SECRET_FIELDS: &[&str] = &["api_key", "token", "auth_token"];

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) {
                    if let Value::String(s) = v {
                        *v = Value::String(grip_core::config::secret::mask_for_display(s));
                    }
                } else {
                    mask_secrets(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

pub async fn dispatch(config_path: Option<&Path>, action: ConfigAction) -> Result<(), String> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path).map_err(|e| e.to_string())?;
            let mut value = serde_json::to_value(&config).map_err(|e| e.to_string())?;
            mask_secrets(&mut value);
            println!("{}", serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?);
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let path = config_path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
            let mut root: Value = if path.exists() {
                let text = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
                serde_json::from_str(&text).unwrap_or(Value::Object(serde_json::Map::new()))
            } else {
                Value::Object(serde_json::Map::new())
            };

            let parsed = serde_json::from_str(&value).unwrap_or(Value::String(value.clone()));
            let segments: Vec<&str> = key.split('.').collect();
            if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
                return Err(format!("invalid key: '{key}'"));
            }
            set_nested(&mut root, &segments, parsed);

            // Round-trip through the typed schema so a bad key/value
            // combination fails loudly instead of writing junk.
            let typed: grip_core::config::GripConfig =
                serde_json::from_value(root.clone()).map_err(|e| format!("invalid configuration after set: {e}"))?;
            grip_core::config::save_config(&typed, config_path).map_err(|e| e.to_string())?;
            println!("Set {key} = {value}");
            Ok(())
        }
    }
}

fn set_nested(root: &mut Value, path: &[&str], value: Value) {
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    let obj = root.as_object_mut().expect("just ensured object");
    if path.len() == 1 {
        obj.insert(path[0].to_string(), value);
        return;
    }
    let child = obj.entry(path[0].to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_nested(child, &path[1..], value);
}
