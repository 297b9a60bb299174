//! Disk-backed exact-match cache of `(normalized_message, model) →
//! response`, with TTL expiry and LRU eviction by access time.
//!
//! Despite the name this is not vector-based: the key is a SHA-256 of
//! the stripped, lowercased message plus the model id.

use crate::error::GripResult;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheEntry {
    pub response: String,
    pub model: String,
    pub created_at: f64,
    pub accessed_at: f64,
    pub message_preview: String,
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn make_key(message: &str, model: &str) -> String {
    let normalized = message.trim().to_lowercase();
    let raw = format!("{normalized}||{model}");
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

pub struct SemanticCache {
    cache_file: PathBuf,
    ttl_seconds: u64,
    max_entries: usize,
    enabled: bool,
    entries: Mutex<HashMap<String, SemanticCacheEntry>>,
}

impl SemanticCache {
    pub fn new(state_dir: impl Into<PathBuf>, ttl_seconds: u64, max_entries: usize, enabled: bool) -> GripResult<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir)?;
        let cache_file = state_dir.join("semantic_cache.json");
        let entries = Mutex::new(Self::load(&cache_file, ttl_seconds));
        Ok(Self { cache_file, ttl_seconds, max_entries, enabled, entries })
    }

    fn load(cache_file: &Path, ttl_seconds: u64) -> HashMap<String, SemanticCacheEntry> {
        if !cache_file.exists() {
            return HashMap::new();
        }
        let Ok(text) = std::fs::read_to_string(cache_file) else { return HashMap::new() };
        let Ok(data) = serde_json::from_str::<HashMap<String, SemanticCacheEntry>>(&text) else {
            log::warn!("Corrupt semantic cache file, resetting");
            return HashMap::new();
        };
        let now = now_secs();
        data.into_iter().filter(|(_, v)| now - v.created_at < ttl_seconds as f64).collect()
    }

    fn save(&self, entries: &HashMap<String, SemanticCacheEntry>) -> GripResult<()> {
        let json = serde_json::to_string(entries)?;
        let tmp = self.cache_file.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.cache_file)?;
        Ok(())
    }

    pub fn get(&self, message: &str, model: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = make_key(message, model);
        let mut entries = self.entries.lock();
        let expired = match entries.get(&key) {
            Some(e) => now_secs() - e.created_at >= self.ttl_seconds as f64,
            None => return None,
        };
        if expired {
            entries.remove(&key);
            return None;
        }
        let entry = entries.get_mut(&key)?;
        entry.accessed_at = now_secs();
        log::debug!("Semantic cache hit for key {}...", &key[..8.min(key.len())]);
        Some(entry.response.clone())
    }

    pub fn put(&self, message: &str, model: &str, response: &str) -> GripResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let key = make_key(message, model);
        let now = now_secs();
        let preview: String = message.chars().take(100).collect();
        {
            let mut entries = self.entries.lock();
            entries.insert(
                key,
                SemanticCacheEntry {
                    response: response.to_string(),
                    model: model.to_string(),
                    created_at: now,
                    accessed_at: now,
                    message_preview: preview,
                },
            );
            if entries.len() > self.max_entries {
                let mut by_access: Vec<(String, f64)> =
                    entries.iter().map(|(k, v)| (k.clone(), v.accessed_at)).collect();
                by_access.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                let excess = entries.len() - self.max_entries;
                for (k, _) in by_access.into_iter().take(excess) {
                    entries.remove(&k);
                }
            }
        }
        let snapshot = self.entries.lock().clone();
        self.save(&snapshot)
    }

    pub fn invalidate(&self, message: &str, model: &str) -> GripResult<bool> {
        let key = make_key(message, model);
        let existed = {
            let mut entries = self.entries.lock();
            entries.remove(&key).is_some()
        };
        if existed {
            let snapshot = self.entries.lock().clone();
            self.save(&snapshot)?;
        }
        Ok(existed)
    }

    pub fn clear(&self) -> GripResult<usize> {
        let count = {
            let mut entries = self.entries.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        self.save(&HashMap::new())?;
        Ok(count)
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let now = now_secs();
        let active = entries.values().filter(|v| now - v.created_at < self.ttl_seconds as f64).count();
        CacheStats {
            total_entries: entries.len(),
            active_entries: active,
            max_entries: self.max_entries,
            ttl_seconds: self.ttl_seconds,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub max_entries: usize,
    pub ttl_seconds: u64,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: u64, max: usize) -> (tempfile::TempDir, SemanticCache) {
        let dir = tempfile::tempdir().unwrap();
        let c = SemanticCache::new(dir.path(), ttl, max, true).unwrap();
        (dir, c)
    }

    #[test]
    fn key_is_stable_for_normalized_message_and_model() {
        assert_eq!(make_key("  Hello World  ", "gpt-4o"), make_key("hello world", "gpt-4o"));
        assert_ne!(make_key("hello", "gpt-4o"), make_key("hello", "claude"));
    }

    #[test]
    fn put_then_get_returns_same_response() {
        let (_dir, c) = cache(3600, 500);
        c.put("What is 2+2?", "gpt-4o", "4").unwrap();
        assert_eq!(c.get("What is 2+2?", "gpt-4o").as_deref(), Some("4"));
        assert_eq!(c.get("what is 2+2?", "gpt-4o").as_deref(), Some("4"));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let (_dir, c) = cache(0, 500);
        c.put("hi", "gpt-4o", "hello").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(c.get("hi", "gpt-4o"), None);
    }

    #[test]
    fn disabled_cache_never_hits() {
        let dir = tempfile::tempdir().unwrap();
        let c = SemanticCache::new(dir.path(), 3600, 500, false).unwrap();
        c.put("hi", "gpt-4o", "hello").unwrap();
        assert_eq!(c.get("hi", "gpt-4o"), None);
    }

    #[test]
    fn evicts_lru_beyond_max_entries() {
        let (_dir, c) = cache(3600, 2);
        c.put("a", "m", "1").unwrap();
        c.put("b", "m", "2").unwrap();
        c.put("c", "m", "3").unwrap();
        assert_eq!(c.size(), 2);
        assert_eq!(c.get("a", "m"), None);
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let c = SemanticCache::new(dir.path(), 3600, 500, true).unwrap();
            c.put("hi", "gpt-4o", "hello").unwrap();
        }
        let c2 = SemanticCache::new(dir.path(), 3600, 500, true).unwrap();
        assert_eq!(c2.get("hi", "gpt-4o").as_deref(), Some("hello"));
    }
}
