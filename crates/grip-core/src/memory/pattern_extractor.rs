//! Rule-based post-interaction pattern mining — zero LLM calls.
//!
//! Scans the user message and agent response for recurring patterns
//! (preferences, decisions, error resolutions) and tracks tool-call
//! frequency across calls, feeding a `KnowledgeBase`.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

const MAX_EXTRACTIONS_PER_CALL: usize = 3;
const MAX_CONTENT_LENGTH: usize = 120;
const TOOL_FREQUENCY_THRESHOLD: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPattern {
    pub category: String,
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
}

static PREFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:i (?:prefer|like|want|always use|love))\s+(.{5,80})",
        r"(?i)(?:my (?:favorite|preferred|default))\s+(?:is\s+)?(.{5,80})",
        r"(?i)(?:don'?t|do not|never|stop)\s+(?:use|show|suggest|include)\s+(.{5,80})",
        r"(?i)(?:please (?:always|never))\s+(.{5,80})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static DECISION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:let'?s (?:use|go with|switch to|try))\s+(.{5,80})",
        r"(?i)(?:we (?:decided|agreed|chose|picked))\s+(?:to\s+)?(.{5,80})",
        r"(?i)(?:going (?:with|forward with))\s+(.{5,80})",
        r"(?i)(?:the plan is to)\s+(.{5,80})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static ERROR_RESOLUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(?:Error|error|ERROR)[:\s]+(.{10,120})").expect("static pattern"));

fn clean(text: &str) -> String {
    let collapsed = Regex::new(r"\s+").unwrap().replace_all(text, " ").trim().to_string();
    let trimmed = collapsed.trim_end_matches(['.', ',', ';', ':']);
    trimmed.chars().take(MAX_CONTENT_LENGTH).collect()
}

/// Extracts patterns across interactions. Stateful: tracks per-tool
/// call counts so that a frequently-used tool is recorded only once
/// (the call on which its count crosses the threshold).
pub struct PatternExtractor {
    tool_counts: HashMap<String, u64>,
    recorded_tools: HashSet<String>,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self { tool_counts: HashMap::new(), recorded_tools: HashSet::new() }
    }

    /// Return up to `MAX_EXTRACTIONS_PER_CALL` patterns from one interaction.
    pub fn extract(&mut self, user_message: &str, response: &str, tool_calls: &[String]) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();
        self.extract_preferences(user_message, &mut patterns);
        self.extract_decisions(user_message, &mut patterns);
        self.extract_error_patterns(response, &mut patterns);
        self.extract_tool_frequency(tool_calls, &mut patterns);

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for p in patterns {
            let key = (p.category.clone(), p.content.trim().to_lowercase());
            if seen.insert(key) {
                unique.push(p);
            }
        }
        unique.truncate(MAX_EXTRACTIONS_PER_CALL);
        unique
    }

    fn extract_preferences(&self, text: &str, out: &mut Vec<ExtractedPattern>) {
        for pattern in PREFERENCE_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(text) {
                let content = clean(&captures[1]);
                if !content.is_empty() {
                    out.push(ExtractedPattern {
                        category: "user_preference".to_string(),
                        content,
                        source: "user_message".to_string(),
                        tags: vec!["preference".to_string()],
                    });
                }
            }
        }
    }

    fn extract_decisions(&self, text: &str, out: &mut Vec<ExtractedPattern>) {
        for pattern in DECISION_PATTERNS.iter() {
            if let Some(captures) = pattern.captures(text) {
                let content = clean(&captures[1]);
                if !content.is_empty() {
                    out.push(ExtractedPattern {
                        category: "project_decision".to_string(),
                        content,
                        source: "user_message".to_string(),
                        tags: vec!["decision".to_string()],
                    });
                }
            }
        }
    }

    fn extract_error_patterns(&self, response: &str, out: &mut Vec<ExtractedPattern>) {
        if let Some(captures) = ERROR_RESOLUTION_PATTERN.captures(response) {
            let content = clean(&captures[1]);
            if content.len() >= 10 {
                out.push(ExtractedPattern {
                    category: "error_pattern".to_string(),
                    content,
                    source: "agent_response".to_string(),
                    tags: vec!["error".to_string()],
                });
            }
        }
    }

    fn extract_tool_frequency(&mut self, tool_calls: &[String], out: &mut Vec<ExtractedPattern>) {
        for name in tool_calls {
            let count = self.tool_counts.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count >= TOOL_FREQUENCY_THRESHOLD && !self.recorded_tools.contains(name) {
                self.recorded_tools.insert(name.clone());
                out.push(ExtractedPattern {
                    category: "system_behavior".to_string(),
                    content: format!("Tool '{name}' is frequently used"),
                    source: "tool_usage".to_string(),
                    tags: vec!["tool_frequency".to_string(), name.clone()],
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_user_preference() {
        let mut ext = PatternExtractor::new();
        let patterns = ext.extract("I prefer dark mode for coding", "ok", &[]);
        assert!(patterns.iter().any(|p| p.category == "user_preference"));
    }

    #[test]
    fn extracts_project_decision() {
        let mut ext = PatternExtractor::new();
        let patterns = ext.extract("Let's use PostgreSQL for storage", "ok", &[]);
        assert!(patterns.iter().any(|p| p.category == "project_decision"));
    }

    #[test]
    fn extracts_error_pattern_from_response() {
        let mut ext = PatternExtractor::new();
        let patterns = ext.extract("hi", "Error: connection refused while reaching the database", &[]);
        assert!(patterns.iter().any(|p| p.category == "error_pattern"));
    }

    #[test]
    fn records_frequent_tool_only_once() {
        let mut ext = PatternExtractor::new();
        let mut total = 0;
        for _ in 0..10 {
            let patterns = ext.extract("hi", "ok", &["read_file".to_string()]);
            total += patterns.iter().filter(|p| p.category == "system_behavior").count();
        }
        assert_eq!(total, 1);
    }

    #[test]
    fn caps_extractions_per_call() {
        let mut ext = PatternExtractor::new();
        let patterns = ext.extract(
            "I prefer dark mode. My favorite editor is vim. Don't use tabs. Please always use spaces.",
            "ok",
            &[],
        );
        assert!(patterns.len() <= 3);
    }
}
