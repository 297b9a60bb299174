//! OpenAI-compatible chat-completions adapter. Covers OpenAI itself
//! and every provider that mirrors its wire format (OpenRouter,
//! DeepSeek, Groq, Qwen, MiniMax, Moonshot, Ollama, Llama.cpp,
//! LM Studio, vLLM, Zhipu).

use super::classify::{classify_status, classify_transport_error};
use super::types::{ChatParams, LLMProvider};
use crate::error::{GripError, GripResult};
use crate::types::{LLMResponse, Message, Role, TokenUsage, ToolCall};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct OpenAiCompatProvider {
    provider_name: String,
    api_base: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(provider_name: &str, api_base: &str, api_key: &str, default_model: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn message_to_wire(msg: &Message) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("role".to_string(), json!(role_str(msg.role)));

        if let Some(content) = &msg.content {
            obj.insert("content".to_string(), json!(content));
        } else {
            obj.insert("content".to_string(), Value::Null);
        }

        if !msg.tool_calls.is_empty() {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.function_name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            obj.insert("tool_calls".to_string(), Value::Array(calls));
        }

        if let Some(id) = &msg.tool_call_id {
            obj.insert("tool_call_id".to_string(), json!(id));
        }
        if let Some(name) = &msg.name {
            obj.insert("name".to_string(), json!(name));
        }

        Value::Object(obj)
    }

    fn parse_response(&self, body: &Value) -> LLMResponse {
        let choice = &body["choices"][0];
        let message = &choice["message"];

        let content = message["content"].as_str().map(|s| s.to_string());

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|tc| {
                        let id = tc["id"].as_str().unwrap_or_default().to_string();
                        let name = tc["function"]["name"].as_str().unwrap_or_default().to_string();
                        let raw_args = tc["function"]["arguments"].as_str().unwrap_or("{}");
                        Some(ToolCall {
                            id,
                            function_name: name,
                            arguments: ToolCall::parse_arguments(raw_args),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = TokenUsage {
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0),
        };

        let reasoning_content = message["reasoning_content"].as_str().map(|s| s.to_string());

        LLMResponse { content, tool_calls, usage, reasoning_content, raw: body.clone() }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatProvider {
    async fn chat(&self, messages: &[Message], params: &ChatParams) -> GripResult<LLMResponse> {
        let model = params.model.clone().unwrap_or_else(|| self.default_model.clone());
        let mut body = json!({
            "model": model,
            "messages": messages.iter().map(Self::message_to_wire).collect::<Vec<_>>(),
        });

        if let Some(tools) = &params.tools {
            body["tools"] = json!(tools);
        }
        if let Some(t) = params.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(mt) = params.max_tokens {
            body["max_tokens"] = json!(mt);
        }

        let mut req = self.client.post(format!("{}/chat/completions", self.api_base)).json(&body);
        if !self.api_key.is_empty() && self.api_key != "not-needed" {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req.send().await.map_err(|e| classify_transport_error(&e, &self.provider_name))?;
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
    fn parses_content_only_response() {
        let provider = OpenAiCompatProvider::new("test", "http://x", "k", "m");
        let body = json!({
            "choices": [{"message": {"content": "hello", "tool_calls": null}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        });
        let parsed = provider.parse_response(&body);
        assert_eq!(parsed.content.as_deref(), Some("hello"));
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.usage.total_tokens(), 12);
    }

    #[test]
    fn parses_tool_call_response() {
        let provider = OpenAiCompatProvider::new("test", "http://x", "k", "m");
        let body = json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "function": {"name": "read_file", "arguments": "{\"path\":\"x\"}"}}
            ]}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3}
        });
        let parsed = provider.parse_response(&body);
        assert!(parsed.content.is_none());
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].function_name, "read_file");
        assert_eq!(parsed.tool_calls[0].arguments["path"], "x");
    }
}
