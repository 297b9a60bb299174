//! File-backed OAuth token store for MCP servers.
//!
//! Stored separately from `config.json` (at `<grip_dir>/tokens.json`)
//! so tokens never show up in a config dump, with atomic writes and
//! 0o600 permissions on creation.

use crate::error::GripResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: f64,
    pub token_type: String,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// True once `expires_at` is within 30 seconds of now (or already past).
    /// A zero `expires_at` means the token never expires.
    pub fn is_expired(&self) -> bool {
        if self.expires_at <= 0.0 {
            return false;
        }
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        now >= self.expires_at - 30.0
    }
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(tokens_path: impl Into<PathBuf>) -> Self {
        Self { path: tokens_path.into() }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir().unwrap_or_default().join(".grip").join("tokens.json")
    }

    pub fn get(&self, server_name: &str) -> Option<StoredToken> {
        let all = self.read_all();
        all.get(server_name).cloned()
    }

    pub fn save(&self, server_name: &str, token: StoredToken) -> GripResult<()> {
        let mut all = self.read_all();
        all.insert(server_name.to_string(), token);
        self.write_all(&all)?;
        log::debug!("Saved OAuth token for MCP server '{server_name}'");
        Ok(())
    }

    pub fn delete(&self, server_name: &str) -> GripResult<bool> {
        let mut all = self.read_all();
        if all.remove(server_name).is_none() {
            return Ok(false);
        }
        self.write_all(&all)?;
        log::debug!("Deleted OAuth token for MCP server '{server_name}'");
        Ok(true)
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.read_all().into_keys().collect()
    }

    fn read_all(&self) -> HashMap<String, StoredToken> {
        let Ok(text) = std::fs::read_to_string(&self.path) else { return HashMap::new() };
        match serde_json::from_str(&text) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Failed to read token store {}: {e}", self.path.display());
                HashMap::new()
            }
        }
    }

    fn write_all(&self, data: &HashMap<String, StoredToken>) -> GripResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        restrict_permissions(&tmp);
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: f64) -> StoredToken {
        StoredToken {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_at,
            token_type: "Bearer".to_string(),
            scopes: vec!["read".to_string()],
        }
    }

    #[test]
    fn save_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert!(store.get("todoist").is_none());

        store.save("todoist", token(0.0)).unwrap();
        assert_eq!(store.get("todoist").unwrap().access_token, "at");
        assert_eq!(store.list_servers(), vec!["todoist".to_string()]);

        assert!(store.delete("todoist").unwrap());
        assert!(store.get("todoist").is_none());
        assert!(!store.delete("todoist").unwrap());
    }

    #[test]
    fn zero_expiry_never_expires() {
        assert!(!token(0.0).is_expired());
    }

    #[test]
    fn past_expiry_is_expired() {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        assert!(token(now - 100.0).is_expired());
    }

    #[test]
    fn future_expiry_within_buffer_is_expired() {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        assert!(token(now + 10.0).is_expired());
        assert!(!token(now + 120.0).is_expired());
    }

    #[cfg(unix)]
    #[test]
    fn file_permissions_are_restricted() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::new(&path);
        store.save("svc", token(0.0)).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
