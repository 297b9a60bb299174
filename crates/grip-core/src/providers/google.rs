//! Google Gemini `generateContent` adapter. Wire format differs from
//! both OpenAI and Anthropic: messages are `contents` with `parts`,
//! roles are `user`/`model` (no `assistant`/`tool`), and tool calls
//! round-trip as `functionCall`/`functionResponse` parts.

use super::classify::{classify_status, classify_transport_error};
use super::types::{ChatParams, LLMProvider};
use crate::error::{GripError, GripResult};
use crate::types::{LLMResponse, Message, Role, TokenUsage, ToolCall};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct GoogleProvider {
    provider_name: String,
    api_base: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(provider_name: &str, api_base: &str, api_key: &str, default_model: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn message_to_wire(msg: &Message) -> Option<Value> {
        match msg.role {
            Role::System => None,
            Role::Tool => Some(json!({
                "role": "user",
                "parts": [{
                    "functionResponse": {
                        "name": msg.name.clone().unwrap_or_default(),
                        "response": {"result": msg.content.clone().unwrap_or_default()},
                    }
                }]
            })),
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let mut parts = Vec::new();
                if let Some(text) = &msg.content {
                    if !text.is_empty() {
                        parts.push(json!({"text": text}));
                    }
                }
                for tc in &msg.tool_calls {
                    parts.push(json!({
                        "functionCall": {"name": tc.function_name, "args": tc.arguments}
                    }));
                }
                Some(json!({"role": "model", "parts": parts}))
            }
            Role::Assistant => Some(json!({
                "role": "model",
                "parts": [{"text": msg.content.clone().unwrap_or_default()}],
            })),
            Role::User => Some(json!({
                "role": "user",
                "parts": [{"text": msg.content.clone().unwrap_or_default()}],
            })),
        }
    }

    fn system_instruction(messages: &[Message]) -> Option<Value> {
        let texts: Vec<String> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .filter_map(|m| m.content.clone())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(json!({"parts": [{"text": texts.join("\n\n")}]}))
        }
    }

    fn parse_response(&self, body: &Value) -> LLMResponse {
        let parts = body["candidates"][0]["content"]["parts"].as_array().cloned().unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for (idx, part) in parts.iter().enumerate() {
            if let Some(t) = part["text"].as_str() {
                text.push_str(t);
            }
            if let Some(fc) = part.get("functionCall") {
                tool_calls.push(ToolCall {
                    id: format!("call_{idx}"),
                    function_name: fc["name"].as_str().unwrap_or_default().to_string(),
                    arguments: fc["args"].clone(),
                });
            }
        }

        let usage = TokenUsage {
            prompt_tokens: body["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            completion_tokens: body["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
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
impl LLMProvider for GoogleProvider {
    async fn chat(&self, messages: &[Message], params: &ChatParams) -> GripResult<LLMResponse> {
        let model = params.model.clone().unwrap_or_else(|| self.default_model.clone());

        let contents: Vec<Value> = messages.iter().filter_map(Self::message_to_wire).collect();
        let mut body = json!({ "contents": contents });

        if let Some(sys) = Self::system_instruction(messages) {
            body["systemInstruction"] = sys;
        }
        if let Some(tools) = &params.tools {
            body["tools"] = json!([{"functionDeclarations": tools}]);
        }
        let mut generation_config = serde_json::Map::new();
        if let Some(t) = params.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(mt) = params.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(mt));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        let url = format!("{}/models/{}:generateContent?key={}", self.api_base, model, self.api_key);
        let resp = self
            .client
            .post(url)
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
    fn parses_function_call_part() {
        let provider = GoogleProvider::new("gemini", "http://x", "k", "m");
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"functionCall": {"name": "read_file", "args": {"path": "x"}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
        });
        let parsed = provider.parse_response(&body);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].function_name, "read_file");
        assert_eq!(parsed.usage.total_tokens(), 16);
    }

    #[test]
    fn system_messages_excluded_from_contents() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let contents: Vec<Value> = messages.iter().filter_map(GoogleProvider::message_to_wire).collect();
        assert_eq!(contents.len(), 1);
        assert!(GoogleProvider::system_instruction(&messages).is_some());
    }
}
