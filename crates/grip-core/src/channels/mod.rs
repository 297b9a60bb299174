//! Chat-channel HTTP senders: outbound delivery to Telegram, Discord,
//! and Slack, plus the access-control and message-splitting helpers
//! every bridge shares. Inbound polling/webhook handling lives in the
//! binaries that own each platform's event loop; this module is the
//! part that is actually core — sending a reply and deciding whether
//! a sender is allowed to trigger one.

pub mod discord;
pub mod slack;
pub mod telegram;

use crate::config::schema::ChannelEntry;
use async_trait::async_trait;

pub use discord::DiscordSender;
pub use slack::SlackSender;
pub use telegram::TelegramSender;

/// One outbound delivery channel. `chat_id` is platform-specific: a
/// numeric Telegram chat id, a Discord channel id, or a Slack webhook
/// URL looked up from `extra`.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn name(&self) -> &str;

    /// Send `text` to `chat_id`, splitting it across multiple messages
    /// if it exceeds the platform's length limit.
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), String>;
}

/// Decide whether `sender_id` may address this channel, per its
/// `allow_from` list. An empty list allows everyone.
pub fn is_allowed(entry: &ChannelEntry, sender_id: &str) -> bool {
    entry.allow_from.is_empty() || entry.allow_from.iter().any(|id| id == sender_id)
}

/// Split a long message into chunks at `max_len`, preferring to break
/// on a newline or space so words and lines stay intact.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut remaining = text;
    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }
        let split_at = remaining[..max_len]
            .rfind('\n')
            .or_else(|| remaining[..max_len].rfind(' '))
            .unwrap_or(max_len);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(allow_from: &[&str]) -> ChannelEntry {
        ChannelEntry {
            enabled: true,
            allow_from: allow_from.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_allow_from_allows_anyone() {
        assert!(is_allowed(&entry(&[]), "anyone"));
    }

    #[test]
    fn allow_from_restricts_to_listed_ids() {
        let e = entry(&["123"]);
        assert!(is_allowed(&e, "123"));
        assert!(!is_allowed(&e, "456"));
    }

    #[test]
    fn split_message_short_is_single_chunk() {
        assert_eq!(split_message("hello", 100), vec!["hello".to_string()]);
    }

    #[test]
    fn split_message_prefers_newline_break() {
        let msg = format!("{}\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_message(&msg, 80);
        assert_eq!(chunks[0], "a".repeat(60));
    }

    #[test]
    fn split_message_prefers_space_break() {
        let msg = format!("{} {}", "a".repeat(60), "b".repeat(60));
        let chunks = split_message(&msg, 80);
        assert_eq!(chunks[0], "a".repeat(60));
    }

    #[test]
    fn split_message_over_boundary_all_fit() {
        let msg = "word ".repeat(50);
        let chunks = split_message(msg.trim(), 100);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 100);
        }
    }
}
