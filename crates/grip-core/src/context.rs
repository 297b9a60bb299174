//! System prompt assembly: identity documents, a skills listing, a
//! tone-adaptation hint, and runtime metadata, joined into one prompt
//! string. Tool schemas are deliberately not part of this prompt —
//! they travel through the provider's separate `tools` parameter.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const SECTION_JOIN: &str = "\n\n---\n\n";

/// Identity files concatenated in this order when present. Each file
/// is optional; missing files are skipped rather than erroring.
const IDENTITY_FILES: &[&str] = ["AGENT.md", "IDENTITY.md", "SOUL.md", "USER.md", "SHIELD.md"];

static FRUSTRATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ugh|frustrat\w*|annoy\w*|this (is|isn'?t) working|still broken|why (won'?t|doesn'?t|isn'?t)|sick of|fed up)\b")
        .expect("static pattern")
});

static CONFUSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(confus\w*|i don'?t (understand|get it)|what do you mean|lost|unclear|makes no sense)\b")
        .expect("static pattern")
});

static URGENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(urgent|asap|right now|immediately|critical|emergency|need this (now|today))\b")
        .expect("static pattern")
});

static GRATITUDE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(thank\w*|appreciate (it|you)|awesome|perfect|great job|that worked)\b").expect("static pattern")
});

/// Cached identity-file concatenation, rebuilt only when the caller
/// asks (identity files change rarely — editing the workspace, not
/// per turn).
pub struct ContextBuilder {
    workspace_path: PathBuf,
    cached_identity: parking_lot::Mutex<Option<String>>,
}

impl ContextBuilder {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self { workspace_path: workspace_path.into(), cached_identity: parking_lot::Mutex::new(None) }
    }

    /// Drop the cached identity concatenation so the next build re-reads disk.
    pub fn invalidate_cache(&self) {
        *self.cached_identity.lock() = None;
    }

    fn identity_section(&self) -> String {
        if let Some(cached) = self.cached_identity.lock().as_ref() {
            return cached.clone();
        }
        let mut parts = Vec::new();
        for name in IDENTITY_FILES {
            let path = self.workspace_path.join(name);
            if let Ok(content) = std::fs::read_to_string(&path) {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
        }
        let joined = parts.join("\n\n");
        *self.cached_identity.lock() = Some(joined.clone());
        joined
    }

    /// Detect the dominant emotional register of `message` and return
    /// a short canned adaptation hint, or `None` when nothing matches.
    /// Checked in priority order: frustration and urgency outrank
    /// confusion and gratitude when a message matches more than one.
    fn tone_hint(message: &str) -> Option<&'static str> {
        if FRUSTRATION_PATTERN.is_match(message) {
            return Some(
                "The user seems frustrated. Be direct, acknowledge the difficulty briefly, \
                 and prioritize getting them to a working result over lengthy explanation.",
            );
        }
        if URGENCY_PATTERN.is_match(message) {
            return Some(
                "The user has signaled urgency. Lead with the answer or fix, skip preamble, \
                 and keep the response as short as correctness allows.",
            );
        }
        if CONFUSION_PATTERN.is_match(message) {
            return Some(
                "The user seems confused. Slow down, avoid jargon, and check understanding \
                 with a concrete example before proceeding.",
            );
        }
        if GRATITUDE_PATTERN.is_match(message) {
            return Some("The user is satisfied with recent progress. A brief acknowledgment is enough; no need to over-explain.");
        }
        None
    }

    fn runtime_metadata(&self, session_key: &str) -> String {
        let now = chrono::Utc::now();
        format!(
            "Current time (UTC): {}\nSession: {}\nWorkspace: {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            session_key,
            self.workspace_path.display()
        )
    }

    /// Assemble the full system prompt for one turn.
    ///
    /// `skills_listing` is supplied by the caller (an external
    /// collaborator renders it; an empty string omits the section).
    pub fn build(&self, session_key: &str, latest_user_message: &str, skills_listing: &str) -> String {
        let mut sections = Vec::new();

        let identity = self.identity_section();
        if !identity.is_empty() {
            sections.push(identity);
        }
        if !skills_listing.trim().is_empty() {
            sections.push(format!("## Available Skills\n\n{}", skills_listing.trim()));
        }
        if let Some(hint) = Self::tone_hint(latest_user_message) {
            sections.push(format!("## Tone Guidance\n\n{hint}"));
        }
        sections.push(self.runtime_metadata(session_key));

        sections.join(SECTION_JOIN)
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_files_concatenate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SOUL.md"), "soul text").unwrap();
        std::fs::write(dir.path().join("AGENT.md"), "agent text").unwrap();
        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build("tg:1", "hi", "");
        let agent_pos = prompt.find("agent text").unwrap();
        let soul_pos = prompt.find("soul text").unwrap();
        assert!(agent_pos < soul_pos);
    }

    #[test]
    fn missing_identity_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build("tg:1", "hi", "");
        assert!(prompt.contains("Session: tg:1"));
    }

    #[test]
    fn frustration_triggers_tone_hint() {
        assert!(ContextBuilder::tone_hint("ugh, this still isn't working").is_some());
    }

    #[test]
    fn neutral_message_has_no_tone_hint() {
        assert!(ContextBuilder::tone_hint("what's the weather like").is_none());
    }

    #[test]
    fn skills_listing_included_when_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(dir.path());
        let prompt = builder.build("tg:1", "hi", "- code_review: reviews a diff");
        assert!(prompt.contains("Available Skills"));
        assert!(prompt.contains("code_review"));
    }

    #[test]
    fn cache_invalidation_picks_up_new_identity_content() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ContextBuilder::new(dir.path());
        let first = builder.build("tg:1", "hi", "");
        assert!(!first.contains("new fact"));
        std::fs::write(dir.path().join("AGENT.md"), "new fact").unwrap();
        builder.invalidate_cache();
        let second = builder.build("tg:1", "hi", "");
        assert!(second.contains("new fact"));
    }
}
