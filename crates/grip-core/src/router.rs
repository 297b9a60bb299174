//! Rule-based complexity routing: picks a model tier for a turn
//! without ever calling an LLM. Classification is a fast regex +
//! length + session-depth heuristic, not a judgment call worth paying
//! for.

use crate::config::schema::ModelTiersConfig;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Low => "low",
            ComplexityTier::Medium => "medium",
            ComplexityTier::High => "high",
        }
    }
}

const LOW_COMPLEXITY_MAX_CHARS: usize = 200;
const SHORT_MESSAGE_MAX_CHARS: usize = 100;
const LONG_MESSAGE_MIN_CHARS: usize = 2000;
const DEEP_SESSION_MESSAGE_COUNT: usize = 30;
const DEEP_SESSION_TOOL_CALLS: usize = 10;
const CODE_BLOCK_NEWLINE_THRESHOLD: usize = 10;

static HIGH_COMPLEXITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(architect|refactor|redesign|migrate|migration)\b",
        r"(?i)\b(debug|investigate|root cause|diagnose)\b.{0,40}\b(why|issue|bug|failing|broken)\b",
        r"(?i)\b(multi-?step|end-?to-?end|comprehensive|thorough(ly)?)\b",
        r"(?i)\b(design|implement)\b.{0,40}\b(system|pipeline|architecture|protocol)\b",
        r"(?i)\bwrite (a|the) (test|tests) for\b",
        r"(?i)\b(compare|evaluate|analyze)\b.{0,40}\b(trade-?offs?|options|approaches)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static LOW_COMPLEXITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(hi|hello|hey|thanks|thank you|ok|okay|cool|nice|sure|yes|no)\b",
        r"(?i)\bwhat (is|are|time|day)\b",
        r"(?i)^\s*(list|show|print)\b.{0,30}$",
        r"(?i)\bgoodbye|bye|see ya\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Classify a single user message plus session depth into a complexity
/// tier. Checks run in a fixed order: an unambiguous high-complexity
/// keyword wins outright; a short message matching a low-complexity
/// pattern is low; a deep session (many prior messages or tool calls)
/// or a very long message is high; a code block or many newlines is at
/// least medium; a short remaining message is low; everything else is
/// medium.
pub fn classify_complexity(message: &str, tool_calls_in_session: usize, message_count_in_session: usize) -> ComplexityTier {
    if HIGH_COMPLEXITY_PATTERNS.iter().any(|p| p.is_match(message)) {
        return ComplexityTier::High;
    }

    if message.len() < LOW_COMPLEXITY_MAX_CHARS && LOW_COMPLEXITY_PATTERNS.iter().any(|p| p.is_match(message)) {
        return ComplexityTier::Low;
    }

    if tool_calls_in_session > DEEP_SESSION_TOOL_CALLS || message_count_in_session > DEEP_SESSION_MESSAGE_COUNT {
        return ComplexityTier::High;
    }

    if message.len() > LONG_MESSAGE_MIN_CHARS {
        return ComplexityTier::High;
    }

    if message.contains("```") || message.matches('\n').count() > CODE_BLOCK_NEWLINE_THRESHOLD {
        return ComplexityTier::Medium;
    }

    if message.len() < SHORT_MESSAGE_MAX_CHARS {
        return ComplexityTier::Low;
    }

    ComplexityTier::Medium
}

/// Resolve a tier to the model string configured for it, falling back
/// to `default_model` when tiers are disabled or the tier's entry is
/// blank.
pub fn select_model(tier: ComplexityTier, tiers: &ModelTiersConfig, default_model: &str) -> String {
    if !tiers.enabled {
        return default_model.to_string();
    }
    let candidate = match tier {
        ComplexityTier::Low => &tiers.low,
        ComplexityTier::Medium => &tiers.medium,
        ComplexityTier::High => &tiers.high,
    };
    if candidate.is_empty() {
        default_model.to_string()
    } else {
        candidate.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_low() {
        assert_eq!(classify_complexity("hey, how's it going", 0, 1), ComplexityTier::Low);
    }

    #[test]
    fn refactor_request_is_high_even_when_short() {
        assert_eq!(classify_complexity("refactor this", 0, 1), ComplexityTier::High);
    }

    #[test]
    fn long_message_is_high() {
        let msg = "word ".repeat(500);
        assert_eq!(classify_complexity(&msg, 0, 1), ComplexityTier::High);
    }

    #[test]
    fn deep_message_count_escalates_to_high() {
        assert_eq!(classify_complexity("what about this approach", 0, 31), ComplexityTier::High);
    }

    #[test]
    fn deep_tool_call_count_escalates_to_high() {
        assert_eq!(classify_complexity("what about this approach", 11, 1), ComplexityTier::High);
    }

    #[test]
    fn mid_length_message_is_medium() {
        let msg = "Can you help me understand how the retry backoff timing works in this particular module and whether it interacts with the session cache at all";
        assert_eq!(classify_complexity(msg, 0, 1), ComplexityTier::Medium);
    }

    #[test]
    fn low_complexity_pattern_is_ignored_past_the_length_gate() {
        // A low-complexity opener ("what is ...") padded past 200 chars
        // must not short-circuit to Low; it falls through to the
        // length/code-block rules like any other message.
        let msg = format!("what is the best way to do this, {}", "x".repeat(200));
        assert_eq!(classify_complexity(&msg, 0, 1), ComplexityTier::Medium);
    }

    #[test]
    fn code_block_is_medium_even_when_short_enough_for_low() {
        let msg = "```\nlet x = 1;\n```";
        assert_eq!(classify_complexity(msg, 0, 1), ComplexityTier::Medium);
    }

    #[test]
    fn many_newlines_without_fence_is_medium() {
        let msg = "line\n".repeat(12);
        assert_eq!(classify_complexity(&msg, 0, 1), ComplexityTier::Medium);
    }

    #[test]
    fn short_plain_message_is_low() {
        assert_eq!(classify_complexity("what time does the train leave", 0, 1), ComplexityTier::Low);
    }

    #[test]
    fn select_model_falls_back_when_tier_blank() {
        let tiers = ModelTiersConfig { enabled: true, low: String::new(), medium: "mid-model".into(), high: String::new() };
        assert_eq!(select_model(ComplexityTier::Low, &tiers, "default-model"), "default-model");
        assert_eq!(select_model(ComplexityTier::Medium, &tiers, "default-model"), "mid-model");
    }

    #[test]
    fn select_model_ignores_tiers_when_disabled() {
        let tiers = ModelTiersConfig { enabled: false, low: "low-model".into(), medium: String::new(), high: String::new() };
        assert_eq!(select_model(ComplexityTier::Low, &tiers, "default-model"), "default-model");
    }
}
