//! Typed, deduplicated, category-indexed knowledge entries backed by
//! `memory/knowledge.json`.

use crate::error::GripResult;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

pub const VALID_CATEGORIES: &[&str] =
    &["user_preference", "project_decision", "system_behavior", "learned_fact", "error_pattern"];

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: f64,
    pub accessed_at: f64,
    #[serde(default)]
    pub access_count: u64,
}

/// First 16 hex chars of SHA-256(`category:lower(strip(content))`) —
/// this makes `add` dedup by semantic content, not object identity.
fn make_id(category: &str, content: &str) -> String {
    let raw = format!("{category}:{}", content.trim().to_lowercase());
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let hex: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnowledgeFile {
    version: u32,
    entries: Vec<KnowledgeEntry>,
}

pub struct KnowledgeBase {
    kb_path: PathBuf,
    entries: Mutex<HashMap<String, KnowledgeEntry>>,
}

impl KnowledgeBase {
    pub fn new(memory_dir: impl Into<PathBuf>) -> GripResult<Self> {
        let memory_dir = memory_dir.into();
        std::fs::create_dir_all(&memory_dir)?;
        let kb_path = memory_dir.join("knowledge.json");
        let entries = Mutex::new(Self::load(&kb_path));
        Ok(Self { kb_path, entries })
    }

    fn load(kb_path: &std::path::Path) -> HashMap<String, KnowledgeEntry> {
        if !kb_path.exists() {
            return HashMap::new();
        }
        let Ok(text) = std::fs::read_to_string(kb_path) else { return HashMap::new() };
        match serde_json::from_str::<KnowledgeFile>(&text) {
            Ok(file) => file.entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
            Err(e) => {
                log::warn!("Corrupt knowledge base file, starting fresh: {e}");
                HashMap::new()
            }
        }
    }

    fn save(&self, entries: &HashMap<String, KnowledgeEntry>) -> GripResult<()> {
        let file = KnowledgeFile { version: 1, entries: entries.values().cloned().collect() };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.kb_path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.kb_path)?;
        Ok(())
    }

    /// Add a knowledge entry, deduplicating by `(category, normalized content)`.
    /// If an entry with that id already exists, bumps its access time
    /// and count and returns the existing entry rather than inserting.
    pub fn add(&self, category: &str, content: &str, source: &str, tags: Vec<String>) -> GripResult<KnowledgeEntry> {
        let category = if VALID_CATEGORIES.contains(&category) {
            category.to_string()
        } else {
            log::warn!("Unknown knowledge category '{category}', defaulting to 'learned_fact'");
            "learned_fact".to_string()
        };
        let id = make_id(&category, content);

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get_mut(&id) {
            existing.accessed_at = now_secs();
            existing.access_count += 1;
            let snapshot = existing.clone();
            self.save(&entries)?;
            log::debug!("Knowledge entry already exists (id={id}), updated access time");
            return Ok(snapshot);
        }

        let now = now_secs();
        let entry = KnowledgeEntry {
            id: id.clone(),
            category,
            content: content.trim().to_string(),
            source: source.to_string(),
            tags,
            created_at: now,
            accessed_at: now,
            access_count: 0,
        };
        entries.insert(id.clone(), entry.clone());
        self.save(&entries)?;
        log::info!("Added knowledge entry: {id} (category={})", entry.category);
        Ok(entry)
    }

    pub fn get(&self, entry_id: &str) -> Option<KnowledgeEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(entry_id)?;
        entry.accessed_at = now_secs();
        entry.access_count += 1;
        Some(entry.clone())
    }

    /// Filter by category (if non-empty) and substring match over
    /// `content + tags + source` (if query non-empty), then rank by
    /// `(access_count, created_at)` descending.
    pub fn search(&self, query: &str, category: &str, max_results: usize) -> Vec<KnowledgeEntry> {
        let query_lower = query.to_lowercase();
        let entries = self.entries.lock();
        let mut results: Vec<KnowledgeEntry> = entries
            .values()
            .filter(|e| category.is_empty() || e.category == category)
            .filter(|e| {
                if query_lower.is_empty() {
                    return true;
                }
                let searchable = format!("{} {} {}", e.content, e.tags.join(" "), e.source).to_lowercase();
                searchable.contains(&query_lower)
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            b.access_count.cmp(&a.access_count).then_with(|| {
                b.created_at.partial_cmp(&a.created_at).unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        results.truncate(max_results);
        results
    }

    pub fn by_category(&self, category: &str) -> Vec<KnowledgeEntry> {
        let entries = self.entries.lock();
        let mut results: Vec<KnowledgeEntry> = entries.values().filter(|e| e.category == category).cloned().collect();
        results.sort_by(|a, b| b.created_at.partial_cmp(&a.created_at).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    pub fn remove(&self, entry_id: &str) -> GripResult<bool> {
        let mut entries = self.entries.lock();
        if entries.remove(entry_id).is_some() {
            self.save(&entries)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn clear_category(&self, category: &str) -> GripResult<usize> {
        let mut entries = self.entries.lock();
        let to_remove: Vec<String> =
            entries.values().filter(|e| e.category == category).map(|e| e.id.clone()).collect();
        for id in &to_remove {
            entries.remove(id);
        }
        if !to_remove.is_empty() {
            self.save(&entries)?;
        }
        Ok(to_remove.len())
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn stats(&self) -> KnowledgeStats {
        let entries = self.entries.lock();
        let mut category_counts: HashMap<String, usize> = HashMap::new();
        for e in entries.values() {
            *category_counts.entry(e.category.clone()).or_insert(0) += 1;
        }
        KnowledgeStats { total_entries: entries.len(), category_counts }
    }

    /// Emit entries grouped in priority order (preferences, decisions,
    /// error patterns, behaviors, facts) until `max_chars` is exhausted.
    pub fn export_for_context(&self, max_chars: usize) -> String {
        const PRIORITY: &[&str] =
            &["user_preference", "project_decision", "error_pattern", "system_behavior", "learned_fact"];

        let mut lines = Vec::new();
        let mut total_chars = 0usize;
        'outer: for category in PRIORITY {
            for entry in self.by_category(category) {
                let line = format!("[{}] {}", entry.category, entry.content);
                if total_chars + line.len() > max_chars {
                    break 'outer;
                }
                total_chars += line.len() + 1;
                lines.push(line);
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub category_counts: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb() -> (tempfile::TempDir, KnowledgeBase) {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::new(dir.path()).unwrap();
        (dir, kb)
    }

    #[test]
    fn add_dedups_by_category_and_normalized_content() {
        let (_dir, kb) = kb();
        let a = kb.add("user_preference", "User prefers dark mode", "chat", vec![]).unwrap();
        let b = kb.add("user_preference", "  USER PREFERS DARK MODE  ", "chat", vec![]).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(kb.count(), 1);
        assert_eq!(b.access_count, 1);
    }

    #[test]
    fn unknown_category_defaults_to_learned_fact() {
        let (_dir, kb) = kb();
        let entry = kb.add("nonsense", "something", "", vec![]).unwrap();
        assert_eq!(entry.category, "learned_fact");
    }

    #[test]
    fn search_filters_by_category_and_query() {
        let (_dir, kb) = kb();
        kb.add("user_preference", "likes dark mode", "", vec![]).unwrap();
        kb.add("project_decision", "use rust for the backend", "", vec![]).unwrap();
        let results = kb.search("dark", "user_preference", 20);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "user_preference");
    }

    #[test]
    fn export_for_context_respects_priority_and_budget() {
        let (_dir, kb) = kb();
        kb.add("learned_fact", "the sky is blue", "", vec![]).unwrap();
        kb.add("user_preference", "likes dark mode", "", vec![]).unwrap();
        let exported = kb.export_for_context(2000);
        let pref_idx = exported.find("likes dark mode").unwrap();
        let fact_idx = exported.find("the sky is blue").unwrap();
        assert!(pref_idx < fact_idx);
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let kb = KnowledgeBase::new(dir.path()).unwrap();
            kb.add("learned_fact", "water boils at 100C", "", vec![]).unwrap();
        }
        let kb2 = KnowledgeBase::new(dir.path()).unwrap();
        assert_eq!(kb2.count(), 1);
    }
}
