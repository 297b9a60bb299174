//! Anthropic Messages API adapter. Distinct wire format from the
//! OpenAI-compatible chat-completions shape: `system` is a top-level
//! field (not a message role), and tool calls come back as
//! `content` blocks of type `tool_use`.

use super::classify::{classify_status, classify_transport_error};
use super::types::{ChatParams, LLMProvider};
use crate::error::{GripError, GripResult};
use crate::types::{LLMResponse, Message, Role, TokenUsage, ToolCall};
use async_trait::async_trait;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    provider_name: String,
    api_base: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(provider_name: &str, api_base: &str, api_key: &str, default_model: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn split_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts = Vec::new();
        let mut rest = Vec::new();
        for m in messages {
            if m.role == Role::System {
                if let Some(c) = &m.content {
                    system_parts.push(c.clone());
                }
            } else {
                rest.push(m);
            }
        }
        let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) };
        (system, rest)
    }

    fn message_to_wire(msg: &Message) -> Value {
        match msg.role {
            Role::Tool => json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content.clone().unwrap_or_default(),
                }]
            }),
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let mut blocks = Vec::new();
                if let Some(text) = &msg.content {
                    if !text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text}));
                    }
                }
                for tc in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.function_name,
                        "input": tc.arguments,
                    }));
                }
                json!({"role": "assistant", "content": blocks})
            }
            _ => json!({
                "role": if msg.role == Role::Assistant { "assistant" } else { "user" },
                "content": msg.content.clone().unwrap_or_default(),
            }),
        }
    }

    fn parse_response(&self, body: &Value) -> LLMResponse {
        let blocks = body["content"].as_array().cloned().unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &blocks {
            match block["type"].as_str() {
                Some("text") => text.push_str(block["text"].as_str().unwrap_or("")),
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        function_name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].clone(),
                    });
                }
                _ => {}
            }
        }

        let usage = TokenUsage {
            prompt_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0),
            completion_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        LLMResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            usage,
            reasoning_content: None,
            raw: body.clone(),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat(&self, messages: &[Message], params: &ChatParams) -> GripResult<LLMResponse> {
        let model = params.model.clone().unwrap_or_else(|| self.default_model.clone());
        let (system, rest) = Self::split_system(messages);

        let mut body = json!({
            "model": model,
            "max_tokens": params.max_tokens.unwrap_or(4096),
            "messages": rest.iter().map(|m| Self::message_to_wire(m)).collect::<Vec<_>>(),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(tools) = &params.tools {
            body["tools"] = json!(tools);
        }
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }

        let resp = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, &self.provider_name))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &self.provider_name, &model, &text));
        }

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| GripError::ProviderOther { provider: self.provider_name.clone(), message: e.to_string() })?;

        Ok(self.parse_response(&parsed))
    }

    fn name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_text_and_tool_use() {
        let provider = AnthropicProvider::new("anthropic", "http://x", "k", "m");
        let body = json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {"path": "x"}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8}
        });
        let parsed = provider.parse_response(&body);
        assert_eq!(parsed.content.as_deref(), Some("Let me check."));
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].id, "toolu_1");
    }

    #[test]
    fn splits_system_messages_from_history() {
        let messages = vec![Message::system("be concise"), Message::user("hi")];
        let (system, rest) = AnthropicProvider::split_system(&messages);
        assert_eq!(system.as_deref(), Some("be concise"));
        assert_eq!(rest.len(), 1);
    }
}
