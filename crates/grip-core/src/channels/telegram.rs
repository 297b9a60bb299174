//! Telegram Bot API sender: `POST https://api.telegram.org/bot<token>/sendMessage`.

use super::{split_message, ChannelSender};
use async_trait::async_trait;

const MAX_MESSAGE_LEN: usize = 4096;

pub struct TelegramSender {
    token: String,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({"chat_id": chat_id, "text": chunk}))
                .send()
                .await
                .map_err(|e| format!("telegram sendMessage failed: {e}"))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(format!("telegram sendMessage rejected: {status} {body}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_telegram() {
        assert_eq!(TelegramSender::new("tok").name(), "telegram");
    }
}
