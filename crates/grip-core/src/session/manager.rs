//! `Session` and `SessionManager`: one JSON file per sanitized session
//! key under `<workspace>/sessions/`, an in-memory LRU cache bounded
//! by entry count, and atomic (temp-file + rename) writes.

use crate::error::GripResult;
use crate::types::Message;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_MAX_CACHE: usize = 200;

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`, per the
/// session-key filesystem-safety invariant.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect()
}

/// A single conversation session: its ordered message history, an
/// optional consolidated summary of pruned history, and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = now_secs();
        Self { key: key.into(), messages: Vec::new(), summary: None, created_at: now, updated_at: now }
    }

    pub fn add_message(&mut self, msg: Message) {
        self.messages.push(msg);
        self.updated_at = now_secs();
    }

    /// Tail of the last `window` messages, sent verbatim to the provider.
    pub fn get_recent(&self, window: usize) -> &[Message] {
        let len = self.messages.len();
        if len <= window {
            &self.messages
        } else {
            &self.messages[len - window..]
        }
    }

    /// Messages older than the recent `window` — candidates for consolidation.
    pub fn get_old_messages(&self, window: usize) -> &[Message] {
        let len = self.messages.len();
        if len <= window {
            &[]
        } else {
            &self.messages[..len - window]
        }
    }

    /// Drop everything older than the recent `window`. Returns the
    /// number of messages pruned.
    pub fn prune_to_window(&mut self, window: usize) -> usize {
        let len = self.messages.len();
        if len <= window {
            return 0;
        }
        let pruned = len - window;
        self.messages.drain(0..pruned);
        self.updated_at = now_secs();
        pruned
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Total tool calls the assistant has made across this session's
    /// history, used to gauge session depth for complexity routing.
    pub fn tool_call_count(&self) -> usize {
        self.messages.iter().map(|m| m.tool_calls.len()).sum()
    }
}

/// Manages session JSON files on disk plus an in-memory cache.
///
/// Concurrent runs on the same session key serialize on the async
/// mutex returned by [`SessionManager::lock_for`] — a resolution of
/// the spec's open question in favor of per-session serialization
/// over last-writer-wins.
pub struct SessionManager {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Session>>,
    max_cache_size: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> GripResult<Self> {
        let dir = sessions_dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            max_cache_size: DEFAULT_MAX_CACHE,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_max_cache_size(mut self, n: usize) -> Self {
        self.max_cache_size = n;
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    /// Lock guarding the load-mutate-save sequence for `key`. Callers
    /// hold this for the duration of one `Engine::run`.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    fn load_from_disk(&self, path: &Path) -> GripResult<Session> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load an existing session, or `None` if it has never been created.
    pub fn get(&self, key: &str) -> Option<Session> {
        if let Some(s) = self.cache.lock().get(key) {
            return Some(s.clone());
        }
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match self.load_from_disk(&path) {
            Ok(session) => {
                self.cache.lock().insert(key.to_string(), session.clone());
                self.evict_if_needed();
                Some(session)
            }
            Err(e) => {
                log::warn!("Corrupt session file {}: {e}", path.display());
                None
            }
        }
    }

    /// Load an existing session, or create (and cache, not yet persist) a new one.
    pub fn get_or_create(&self, key: &str) -> Session {
        if let Some(s) = self.get(key) {
            return s;
        }
        let session = Session::new(key);
        self.cache.lock().insert(key.to_string(), session.clone());
        self.evict_if_needed();
        log::debug!("Created new session: {key}");
        session
    }

    /// Persist `session` atomically and refresh the cache entry.
    pub fn save(&self, session: &Session) -> GripResult<()> {
        let mut session = session.clone();
        session.updated_at = now_secs();
        let path = self.path_for(&session.key);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string(&session)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        log::debug!("Saved session '{}' ({} messages)", session.key, session.message_count());
        self.cache.lock().insert(session.key.clone(), session);
        self.evict_if_needed();
        Ok(())
    }

    /// Remove a session from disk and cache. Returns whether a file existed.
    pub fn delete(&self, key: &str) -> bool {
        self.cache.lock().remove(key);
        let path = self.path_for(key);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
            log::debug!("Deleted session: {key}");
            true
        } else {
            false
        }
    }

    /// All session keys found on disk or cached, favoring the cache
    /// to avoid re-reading files already loaded.
    pub fn list_sessions(&self) -> Vec<String> {
        let mut keys: HashSet<String> = self.cache.lock().keys().cloned().collect();
        let cached_stems: HashSet<String> = keys.iter().map(|k| sanitize_key(k)).collect();

        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
                if cached_stems.contains(&stem) {
                    continue;
                }
                let loaded = std::fs::read_to_string(&path).ok().and_then(|t| serde_json::from_str::<Session>(&t).ok());
                match loaded {
                    Some(session) => {
                        keys.insert(session.key);
                    }
                    None => {
                        keys.insert(stem);
                    }
                }
            }
        }
        let mut v: Vec<String> = keys.into_iter().collect();
        v.sort();
        v
    }

    /// Evict least-recently-updated sessions once the cache exceeds `max_cache_size`.
    fn evict_if_needed(&self) {
        let mut cache = self.cache.lock();
        if cache.len() <= self.max_cache_size {
            return;
        }
        let mut by_age: Vec<(String, f64)> = cache.iter().map(|(k, v)| (k.clone(), v.updated_at)).collect();
        by_age.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let excess = cache.len() - self.max_cache_size;
        for (key, _) in by_age.into_iter().take(excess) {
            cache.remove(&key);
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path().join("sessions")).unwrap();
        (dir, mgr)
    }

    #[test]
    fn sanitizes_session_keys_for_filenames() {
        assert_eq!(sanitize_key("telegram:12345"), "telegram_12345");
        assert_eq!(sanitize_key("cli:default"), "cli_default");
        assert_eq!(sanitize_key("a.b-c_d"), "a.b-c_d");
    }

    #[test]
    fn get_or_create_then_get_returns_same_session() {
        let (_dir, mgr) = manager();
        let s = mgr.get_or_create("cli:default");
        assert_eq!(s.message_count(), 0);
        assert!(mgr.get("cli:default").is_some());
    }

    #[test]
    fn round_trips_messages_through_json() {
        let (_dir, mgr) = manager();
        let mut session = mgr.get_or_create("telegram:1");
        session.add_message(Message::user("hi"));
        session.add_message(Message::assistant_tool_calls(
            None,
            vec![ToolCall { id: "a".into(), function_name: "read_file".into(), arguments: serde_json::json!({"path": "x"}) }],
        ));
        session.add_message(Message::tool_result("a", "read_file", "contents"));
        mgr.save(&session).unwrap();

        mgr.clear_cache();
        let reloaded = mgr.get("telegram:1").unwrap();
        assert_eq!(reloaded.messages, session.messages);
        assert_eq!(reloaded.summary, session.summary);
    }

    #[test]
    fn prune_to_window_sets_pruned_count_and_keeps_tail() {
        let (_dir, mgr) = manager();
        let mut session = mgr.get_or_create("cli:x");
        for i in 0..10 {
            session.add_message(Message::user(format!("msg {i}")));
        }
        let pruned = session.prune_to_window(3);
        assert_eq!(pruned, 7);
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.messages[0].content.as_deref(), Some("msg 7"));
    }

    #[test]
    fn delete_removes_file_and_cache_entry() {
        let (_dir, mgr) = manager();
        let session = mgr.get_or_create("cli:y");
        mgr.save(&session).unwrap();
        assert!(mgr.delete("cli:y"));
        assert!(mgr.get("cli:y").is_none());
        assert!(!mgr.delete("cli:y"));
    }

    #[test]
    fn evicts_least_recently_updated_beyond_cache_cap() {
        let (_dir, mgr) = manager();
        let mgr = mgr.with_max_cache_size(2);
        mgr.save(&Session::new("a")).unwrap();
        mgr.save(&Session::new("b")).unwrap();
        mgr.save(&Session::new("c")).unwrap();
        assert_eq!(mgr.cache.lock().len(), 2);
    }
}
