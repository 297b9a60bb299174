//! Slack sender: `POST https://slack.com/api/chat.postMessage` with a
//! bot token; `chat_id` is the target Slack channel id.

use super::{split_message, ChannelSender};
use async_trait::async_trait;

const MAX_MESSAGE_LEN: usize = 40_000;

pub struct SlackSender {
    token: String,
    client: reqwest::Client,
}

impl SlackSender {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), String> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let response = self
                .client
                .post("https://slack.com/api/chat.postMessage")
                .bearer_auth(&self.token)
                .json(&serde_json::json!({"channel": chat_id, "text": chunk}))
                .send()
                .await
                .map_err(|e| format!("slack chat.postMessage failed: {e}"))?;
            if !response.status().is_success() {
                let status = response.status();
                return Err(format!("slack chat.postMessage rejected: {status}"));
            }
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
                let error = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown");
                return Err(format!("slack chat.postMessage error: {error}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_slack() {
        assert_eq!(SlackSender::new("tok").name(), "slack");
    }
}
