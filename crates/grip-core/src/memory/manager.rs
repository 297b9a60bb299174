//! Two-layer memory: `MEMORY.md` for durable, category-tagged facts
//! and `HISTORY.md` for an append-only, timestamped conversation log.
//! Both support TF-IDF keyword search (with optional exponential time
//! decay for history); history rotates to archive files past a size
//! threshold; memory supports Jaccard-similarity deduplication.

use super::tokenize::tokenize;
use crate::error::GripResult;
use crate::providers::types::{ChatParams, LLMProvider};
use crate::types::{Message, Role};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Rotate HISTORY.md once it exceeds this many bytes.
const DEFAULT_HISTORY_MAX_BYTES: u64 = 1_048_576;

pub struct MemoryManager {
    memory_dir: PathBuf,
    memory_path: PathBuf,
    history_path: PathBuf,
    history_max_bytes: u64,
}

impl MemoryManager {
    pub fn new(workspace_path: impl AsRef<Path>) -> GripResult<Self> {
        let memory_dir = workspace_path.as_ref().join("memory");
        std::fs::create_dir_all(&memory_dir)?;
        Ok(Self {
            memory_path: memory_dir.join("MEMORY.md"),
            history_path: memory_dir.join("HISTORY.md"),
            memory_dir,
            history_max_bytes: DEFAULT_HISTORY_MAX_BYTES,
        })
    }

    pub fn with_history_max_bytes(mut self, bytes: u64) -> Self {
        self.history_max_bytes = bytes;
        self
    }

    pub fn memory_path(&self) -> &Path {
        &self.memory_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    // ── MEMORY.md ──────────────────────────────────────────────────

    pub fn read_memory(&self) -> String {
        std::fs::read_to_string(&self.memory_path).unwrap_or_default()
    }

    pub fn write_memory(&self, content: &str) -> GripResult<()> {
        let tmp = self.memory_path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.memory_path)?;
        Ok(())
    }

    pub fn append_to_memory(&self, entry: &str) -> GripResult<()> {
        let mut current = self.read_memory();
        if !current.is_empty() && !current.ends_with('\n') {
            current.push('\n');
        }
        current.push_str(entry.trim_end());
        current.push('\n');
        self.write_memory(&current)
    }

    /// TF-IDF search over MEMORY.md lines, optionally filtered to
    /// lines tagged `[category]`. Falls back to substring matching for
    /// single-token queries.
    pub fn search_memory(&self, query: &str, max_results: usize, category: &str) -> Vec<String> {
        let content = self.read_memory();
        let chunks: Vec<String> =
            content.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();
        let chunks: Vec<String> = if category.is_empty() {
            chunks
        } else {
            let tag = format!("[{category}]");
            chunks.into_iter().filter(|c| c.contains(&tag)).collect()
        };
        if chunks.is_empty() {
            return Vec::new();
        }
        tfidf_search(&chunks, query, max_results)
    }

    pub fn get_memory_stats(&self) -> MemoryStats {
        let content = self.read_memory();
        let mut category_counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            total += 1;
            if let Some(start) = line.find('[') {
                if let Some(end) = line[start..].find(']') {
                    let category = &line[start + 1..start + end];
                    *category_counts.entry(category.to_string()).or_insert(0) += 1;
                }
            }
        }
        MemoryStats { total_entries: total, category_counts, size_bytes: content.len() as u64 }
    }

    /// Drop near-duplicate lines (Jaccard similarity over token sets
    /// at or above `similarity_threshold`), preserving first
    /// occurrence order. Uses an inverted token index to avoid
    /// comparing every pair, but must yield identical output to a
    /// brute-force pairwise scan.
    pub fn compact_memory(&self, similarity_threshold: f64) -> GripResult<usize> {
        let content = self.read_memory();
        let entries: Vec<String> =
            content.lines().map(|l| l.to_string()).filter(|l| !l.trim().is_empty()).collect();
        if entries.len() < 2 {
            return Ok(0);
        }

        let token_sets: Vec<HashSet<String>> =
            entries.iter().map(|e| tokenize(e).into_iter().collect()).collect();

        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, set) in token_sets.iter().enumerate() {
            for tok in set {
                index.entry(tok.as_str()).or_default().push(i);
            }
        }

        let mut keep = vec![true; entries.len()];
        for i in 0..entries.len() {
            if !keep[i] || token_sets[i].is_empty() {
                continue;
            }
            let mut candidates: BTreeSet<usize> = BTreeSet::new();
            for tok in &token_sets[i] {
                if let Some(list) = index.get(tok.as_str()) {
                    for &j in list {
                        if j > i {
                            candidates.insert(j);
                        }
                    }
                }
            }
            for j in candidates {
                if !keep[j] || token_sets[j].is_empty() {
                    continue;
                }
                let inter = token_sets[i].intersection(&token_sets[j]).count();
                let union = token_sets[i].union(&token_sets[j]).count();
                if union > 0 && (inter as f64 / union as f64) >= similarity_threshold {
                    keep[j] = false;
                }
            }
        }

        let removed = keep.iter().filter(|k| !**k).count();
        if removed > 0 {
            let kept: Vec<&str> =
                entries.iter().zip(keep.iter()).filter(|(_, k)| **k).map(|(e, _)| e.as_str()).collect();
            let mut new_content = kept.join("\n");
            new_content.push('\n');
            self.write_memory(&new_content)?;
        }
        Ok(removed)
    }

    // ── HISTORY.md ─────────────────────────────────────────────────

    pub fn read_history(&self) -> String {
        std::fs::read_to_string(&self.history_path).unwrap_or_default()
    }

    /// Append a UTC-timestamped entry, rotating to an archive file if
    /// the log now exceeds `history_max_bytes`.
    pub fn append_history(&self, entry: &str) -> GripResult<()> {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let line = format!("[{timestamp}] {}\n", entry.trim_end());
        {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.history_path)?;
            file.write_all(line.as_bytes())?;
        }
        self.rotate_history_if_needed()
    }

    fn rotate_history_if_needed(&self) -> GripResult<()> {
        let len = std::fs::metadata(&self.history_path).map(|m| m.len()).unwrap_or(0);
        if len <= self.history_max_bytes {
            return Ok(());
        }
        let content = self.read_history();
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() < 2 {
            return Ok(());
        }
        let tail_start = lines.len() / 2;
        let (archived, kept) = lines.split_at(tail_start);

        let mut archive_path = self.archive_path_for_now();
        let mut suffix = 1;
        while archive_path.exists() {
            archive_path = self.memory_dir.join(format!(
                "HISTORY.archive.{}-{suffix}.md",
                Utc::now().format("%Y%m%d_%H%M%S_%6f")
            ));
            suffix += 1;
        }
        let mut archived_text = archived.join("\n");
        archived_text.push('\n');
        std::fs::write(&archive_path, archived_text)?;

        let mut kept_text = kept.join("\n");
        kept_text.push('\n');
        self.write_history_atomic(&kept_text)?;
        log::debug!("Rotated HISTORY.md: archived {} lines to {}", archived.len(), archive_path.display());
        Ok(())
    }

    fn archive_path_for_now(&self) -> PathBuf {
        self.memory_dir.join(format!("HISTORY.archive.{}.md", Utc::now().format("%Y%m%d_%H%M%S_%6f")))
    }

    fn write_history_atomic(&self, content: &str) -> GripResult<()> {
        let tmp = self.history_path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.history_path)?;
        Ok(())
    }

    fn archive_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.memory_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("HISTORY.archive.") && n.ends_with(".md"))
            })
            .collect();
        files.sort();
        files
    }

    /// All history lines across archive files (oldest first) and the
    /// current HISTORY.md, so rotated-out entries remain searchable.
    fn all_history_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for path in self.archive_files() {
            if let Ok(text) = std::fs::read_to_string(&path) {
                lines.extend(text.lines().filter(|l| !l.trim().is_empty()).map(|l| l.to_string()));
            }
        }
        lines.extend(self.read_history().lines().filter(|l| !l.trim().is_empty()).map(|l| l.to_string()));
        lines
    }

    /// TF-IDF search over HISTORY.md (plus archives), with optional
    /// exponential time decay by entry age. `decay_rate = 0` disables
    /// decay. Falls back to substring matching for single-token queries.
    pub fn search_history(&self, query: &str, max_results: usize, decay_rate: f64) -> Vec<String> {
        let lines = self.all_history_lines();
        if lines.is_empty() {
            return Vec::new();
        }

        let query_tokens = tokenize(query);
        if query_tokens.len() <= 1 {
            let query_lower = query.to_lowercase();
            return lines.into_iter().filter(|l| l.to_lowercase().contains(&query_lower)).take(max_results).collect();
        }

        let doc_freq = document_frequency(&lines);
        let total_docs = lines.len();
        let now = Utc::now();

        let mut scored: Vec<(f64, String)> = Vec::new();
        for line in &lines {
            let line_tokens = tokenize(line);
            if line_tokens.is_empty() {
                continue;
            }
            let tf_counts = term_counts(&line_tokens);
            let mut score = 0.0;
            for qt in &query_tokens {
                if let Some(&count) = tf_counts.get(qt.as_str()) {
                    let tf = count as f64 / line_tokens.len() as f64;
                    let df = *doc_freq.get(qt.as_str()).unwrap_or(&0);
                    let idf = ((total_docs + 1) as f64 / (df + 1) as f64).ln() + 1.0;
                    score += tf * idf;
                }
            }
            if score > 0.0 {
                if decay_rate > 0.0 {
                    if let Some(age_days) = parse_history_age_days(line, now) {
                        score *= (-decay_rate * age_days).exp();
                    }
                }
                scored.push((score, line.clone()));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(max_results).map(|(_, l)| l).collect()
    }

    pub fn needs_consolidation(&self, message_count: usize, memory_window: usize) -> bool {
        message_count > memory_window * 2
    }

    /// Extract durable facts from `old_messages` via the LLM, append
    /// them to MEMORY.md under a dated heading, append a one-line
    /// topical summary to HISTORY.md, and return the extracted facts.
    pub async fn consolidate(
        &self,
        old_messages: &[Message],
        provider: &dyn LLMProvider,
        model: &str,
    ) -> GripResult<String> {
        if old_messages.is_empty() {
            return Ok(String::new());
        }

        let conversation_text = format_messages_for_consolidation(old_messages);
        let consolidation_prompt = format!(
            "Extract durable facts, preferences, and decisions from the conversation \
             below. Respond with a bullet list (one fact per line, starting with '-'). \
             Only include information worth remembering long-term; omit small talk and \
             transient details.\n\n{conversation_text}"
        );

        log::info!("Running memory consolidation on {} messages", old_messages.len());

        let messages = vec![
            Message::system("You extract key facts from conversations."),
            Message::user(consolidation_prompt),
        ];
        let params = ChatParams {
            model: Some(model.to_string()),
            tools: None,
            temperature: Some(0.3),
            max_tokens: Some(1024),
        };
        let response = provider.chat(&messages, &params).await?;
        let facts = response.content.unwrap_or_default();

        if !facts.is_empty() && !facts.to_lowercase().contains("no new facts") {
            let heading = format!("\n### Consolidated {}\n{facts}\n", Utc::now().format("%Y-%m-%d"));
            self.append_to_memory(&heading)?;
            log::info!("Appended consolidated facts to MEMORY.md");
        }

        let summary = build_history_summary(old_messages);
        self.append_history(&summary)?;
        log::info!("Appended summary to HISTORY.md");

        Ok(facts)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub category_counts: HashMap<String, usize>,
    pub size_bytes: u64,
}

fn document_frequency(docs: &[String]) -> HashMap<String, usize> {
    let mut df = HashMap::new();
    for doc in docs {
        for token in tokenize(doc).into_iter().collect::<HashSet<_>>() {
            *df.entry(token).or_insert(0) += 1;
        }
    }
    df
}

fn term_counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Shared TF-IDF ranking used by MEMORY.md search (no time decay).
fn tfidf_search(chunks: &[String], query: &str, max_results: usize) -> Vec<String> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return chunks.iter().take(max_results).cloned().collect();
    }
    if query_tokens.len() <= 1 {
        let query_lower = query.to_lowercase();
        return chunks.iter().filter(|c| c.to_lowercase().contains(&query_lower)).take(max_results).cloned().collect();
    }

    let doc_freq = document_frequency(chunks);
    let total = chunks.len();
    let mut scored: Vec<(f64, String)> = Vec::new();
    for chunk in chunks {
        let tokens = tokenize(chunk);
        if tokens.is_empty() {
            continue;
        }
        let tf_counts = term_counts(&tokens);
        let mut score = 0.0;
        for qt in &query_tokens {
            if let Some(&count) = tf_counts.get(qt.as_str()) {
                let tf = count as f64 / tokens.len() as f64;
                let df = *doc_freq.get(qt.as_str()).unwrap_or(&0);
                let idf = ((total + 1) as f64 / (df + 1) as f64).ln() + 1.0;
                score += tf * idf;
            }
        }
        if score > 0.0 {
            scored.push((score, chunk.clone()));
        }
    }
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(max_results).map(|(_, c)| c).collect()
}

/// Parse the `[YYYY-MM-DD HH:MM:SS UTC]` prefix of a HISTORY.md line
/// and return its age in days relative to `now`.
fn parse_history_age_days(line: &str, now: chrono::DateTime<Utc>) -> Option<f64> {
    let start = line.find('[')?;
    let end = line[start..].find(']')? + start;
    let raw = &line[start + 1..end];
    let raw = raw.strip_suffix(" UTC")?;
    let parsed = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    let ts = parsed.and_utc();
    Some((now - ts).num_milliseconds() as f64 / 86_400_000.0)
}

fn format_messages_for_consolidation(messages: &[Message]) -> String {
    let mut lines = Vec::new();
    for msg in messages {
        if msg.role == Role::System {
            continue;
        }
        let prefix = format!("{:?}", msg.role).to_uppercase();
        if let Some(content) = &msg.content {
            let truncated: String = content.chars().take(2000).collect();
            lines.push(format!("{prefix}: {truncated}"));
        }
        if !msg.tool_calls.is_empty() {
            let names: Vec<&str> = msg.tool_calls.iter().map(|tc| tc.function_name.as_str()).collect();
            lines.push(format!("{prefix}: [called tools: {}]", names.join(", ")));
        }
    }
    lines.join("\n")
}

fn build_history_summary(messages: &[Message]) -> String {
    let user_msgs: Vec<&Message> = messages.iter().filter(|m| m.role == Role::User && m.content.is_some()).collect();
    if user_msgs.is_empty() {
        return format!("Consolidated {} messages (no user content)", messages.len());
    }
    let topics: Vec<String> = user_msgs
        .iter()
        .take(5)
        .filter_map(|m| {
            let content = m.content.as_deref()?;
            let snippet: String = content.chars().take(80).collect::<String>().replace('\n', " ").trim().to_string();
            if snippet.is_empty() {
                None
            } else {
                Some(snippet)
            }
        })
        .collect();
    format!("Consolidated {} messages. Topics: {}", messages.len(), topics.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, MemoryManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = MemoryManager::new(dir.path()).unwrap();
        (dir, mgr)
    }

    #[test]
    fn append_and_read_memory() {
        let (_dir, mgr) = manager();
        mgr.append_to_memory("- [preference] User prefers dark mode").unwrap();
        assert!(mgr.read_memory().contains("dark mode"));
    }

    #[test]
    fn search_memory_tfidf_ranks_relevant_chunk_first() {
        let (_dir, mgr) = manager();
        mgr.write_memory(
            "- [preference] User prefers dark mode for editing code\n- [project] Building a web app in rust\n",
        )
        .unwrap();
        let results = mgr.search_memory("dark mode editing preference", 10, "");
        assert_eq!(results[0], "- [preference] User prefers dark mode for editing code");
    }

    #[test]
    fn search_memory_filters_by_category() {
        let (_dir, mgr) = manager();
        mgr.write_memory(
            "- [preference] User likes dark mode\n- [project] Working on grip-ai\n- [preference] User prefers Python\n",
        )
        .unwrap();
        let results = mgr.search_memory("user", 10, "preference");
        assert!(results.iter().all(|r| r.contains("[preference]")));
        assert!(!results.iter().any(|r| r.contains("[project]")));
    }

    #[test]
    fn history_append_adds_timestamp_prefix() {
        let (_dir, mgr) = manager();
        mgr.append_history("did a thing").unwrap();
        let content = mgr.read_history();
        assert!(content.contains("UTC] did a thing"));
    }

    #[test]
    fn decay_rate_ranks_recent_entry_first() {
        let (_dir, mgr) = manager();
        let old = (Utc::now() - chrono::Duration::days(30)).format("%Y-%m-%d %H:%M:%S UTC");
        let recent = (Utc::now() - chrono::Duration::minutes(5)).format("%Y-%m-%d %H:%M:%S UTC");
        let content = format!(
            "[{old}] discussion about python programming language features\n[{recent}] discussion about python programming language features\n"
        );
        std::fs::write(mgr.history_path(), content).unwrap();

        let results = mgr.search_history("python programming language features", 10, 0.1);
        assert_eq!(results.len(), 2);
        assert!(results[0].contains(&recent.to_string()));
    }

    #[test]
    fn decay_rate_zero_keeps_both_entries() {
        let (_dir, mgr) = manager();
        let old = (Utc::now() - chrono::Duration::days(30)).format("%Y-%m-%d %H:%M:%S UTC");
        let recent = (Utc::now() - chrono::Duration::minutes(5)).format("%Y-%m-%d %H:%M:%S UTC");
        let content =
            format!("[{old}] unique alpha beta gamma delta\n[{recent}] unique alpha beta gamma delta\n");
        std::fs::write(mgr.history_path(), content).unwrap();

        let results = mgr.search_history("alpha beta gamma delta", 10, 0.0);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn rotation_triggers_past_threshold_and_keeps_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = MemoryManager::new(dir.path()).unwrap().with_history_max_bytes(500);
        for i in 0..20 {
            mgr.append_history(&format!("Entry {i}: padding text here")).unwrap();
        }
        let archives: Vec<_> = std::fs::read_dir(dir.path().join("memory"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("HISTORY.archive."))
            .collect();
        assert!(!archives.is_empty());
        assert!(mgr.read_history().contains("Entry 19"));
    }

    #[test]
    fn search_history_finds_archived_entries_after_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = MemoryManager::new(dir.path()).unwrap().with_history_max_bytes(500);
        for i in 0..20 {
            mgr.append_history(&format!("Entry {i}: uniquekeyword{i}")).unwrap();
        }
        let results = mgr.search_history("uniquekeyword19", 10, 0.0);
        assert!(!results.is_empty());
    }

    #[test]
    fn no_rotation_below_threshold() {
        let (dir, mgr) = manager();
        mgr.append_history("small entry").unwrap();
        let archives: Vec<_> = std::fs::read_dir(dir.path().join("memory"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("HISTORY.archive."))
            .collect();
        assert!(archives.is_empty());
    }

    #[test]
    fn compact_memory_removes_near_duplicates() {
        let (_dir, mgr) = manager();
        mgr.write_memory(
            "- [pref] User prefers dark mode for editing code\n\
             - [pref] User prefers dark mode for editing code always\n\
             - [project] Working on grip-ai platform\n",
        )
        .unwrap();
        let removed = mgr.compact_memory(0.7).unwrap();
        assert!(removed >= 1);
        assert!(mgr.read_memory().contains("grip-ai"));
    }

    #[test]
    fn compact_memory_keeps_unique_entries() {
        let (_dir, mgr) = manager();
        mgr.write_memory("- [pref] User likes Python\n- [project] Building a web app\n- [fact] Earth orbits the Sun\n")
            .unwrap();
        assert_eq!(mgr.compact_memory(0.7).unwrap(), 0);
    }

    #[test]
    fn compact_memory_matches_brute_force_order() {
        let (_dir, mgr) = manager();
        let entries = vec![
            "- [pref] User prefers dark mode for editing code",
            "- [pref] User prefers dark mode for editing code always",
            "- [project] Working on grip-ai platform",
            "- [fact] Python is a great programming language",
            "- [fact] Python is a wonderful programming language for data",
            "- [pref] Favorite color is blue",
            "- [project] Building REST API with FastAPI",
            "- [project] Building REST API with FastAPI framework",
            "- [fact] The earth revolves around the sun",
            "- [pref] Prefers vim keybindings in editor",
        ];
        let threshold = 0.7;

        let token_sets: Vec<HashSet<String>> = entries.iter().map(|e| tokenize(e).into_iter().collect()).collect();
        let mut keep_bf = vec![true; entries.len()];
        for i in 0..entries.len() {
            if !keep_bf[i] {
                continue;
            }
            for j in (i + 1)..entries.len() {
                if !keep_bf[j] || token_sets[i].is_empty() || token_sets[j].is_empty() {
                    continue;
                }
                let inter = token_sets[i].intersection(&token_sets[j]).count();
                let union = token_sets[i].union(&token_sets[j]).count();
                if union > 0 && (inter as f64 / union as f64) >= threshold {
                    keep_bf[j] = false;
                }
            }
        }
        let expected: Vec<&str> =
            entries.iter().zip(keep_bf.iter()).filter(|(_, k)| **k).map(|(e, _)| *e).collect();

        let mut content = entries.join("\n");
        content.push('\n');
        mgr.write_memory(&content).unwrap();
        mgr.compact_memory(threshold).unwrap();
        let actual: Vec<String> = mgr.read_memory().lines().filter(|l| !l.trim().is_empty()).map(|s| s.to_string()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn memory_stats_counts_categories() {
        let (_dir, mgr) = manager();
        mgr.write_memory("- [preference] Dark mode\n- [preference] Python\n- [project] grip-ai\n").unwrap();
        let stats = mgr.get_memory_stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.category_counts["preference"], 2);
        assert_eq!(stats.category_counts["project"], 1);
        assert!(stats.size_bytes > 0);
    }

    #[test]
    fn needs_consolidation_checks_double_window() {
        let (_dir, mgr) = manager();
        assert!(!mgr.needs_consolidation(50, 30));
        assert!(mgr.needs_consolidation(61, 30));
    }
}
