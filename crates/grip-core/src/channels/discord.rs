//! Discord sender: `POST https://discord.com/api/v10/channels/<id>/messages`
//! authenticated with a bot token.

use super::{split_message, ChannelSender};
use async_trait::async_trait;

const MAX_MESSAGE_LEN: usize = 2000;

pub struct DiscordSender {
    token: String,
    client: reqwest::Client,
}

impl DiscordSender {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let url = format!("https://discord.com/api/v10/channels/{chat_id}/messages");
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(&serde_json::json!({"content": chunk}))
                .send()
                .await
                .map_err(|e| format!("discord message send failed: {e}"))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(format!("discord message send rejected: {status} {body}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_discord() {
        assert_eq!(DiscordSender::new("tok").name(), "discord");
    }
}
