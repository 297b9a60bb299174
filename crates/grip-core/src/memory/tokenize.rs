//! Shared tokenizer for TF-IDF search over MEMORY.md and HISTORY.md:
//! lowercase, extract `[a-z0-9_]+` runs longer than two characters,
//! drop a fixed stopword set.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "is", "it", "in", "on", "at", "to", "of", "for", "and", "or", "but",
        "not", "with", "from", "by", "as", "was", "were", "be", "been", "has", "have", "had",
        "do", "does", "did", "will", "would", "could", "should", "can", "may", "this", "that",
        "these", "those", "i", "you", "he", "she", "we", "they", "me", "him", "her", "us",
        "them", "my", "your", "his", "its", "our", "their", "what", "which", "who", "when",
        "where", "how", "all", "each", "every", "some", "any", "no", "just", "about", "up",
        "out", "so", "if", "then", "than", "too", "very", "also", "here", "there",
    ]
    .into_iter()
    .collect()
});

/// Split `text` into lowercase tokens of length > 2, filtering stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in lower.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            if current.len() > 2 && !STOPWORDS.contains(current.as_str()) {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stopwords_and_short_tokens() {
        let tokens = tokenize("I am a fan of the Rust programming language");
        assert_eq!(tokens, vec!["fan", "rust", "programming", "language"]);
    }

    #[test]
    fn lowercases_and_keeps_underscores() {
        let tokens = tokenize("User_Preference DARK_MODE");
        assert_eq!(tokens, vec!["user_preference", "dark_mode"]);
    }
}
