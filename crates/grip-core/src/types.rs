//! Core data types shared across the engine: messages, tool calls, and
//! the records engines return. Providers translate between this
//! internal format and their own wire format at the provider boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Parse a tool call's arguments from a JSON string, repairing the
    /// common case where the provider hands back a bare non-object
    /// string (e.g. an empty string meaning "no arguments").
    pub fn parse_arguments(raw: &str) -> serde_json::Value {
        if raw.trim().is_empty() {
            return serde_json::json!({});
        }
        match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => serde_json::json!({ "_raw": raw }),
        }
    }
}

/// Token consumption for a single LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A single message in the conversation history.
///
/// An assistant message with `tool_calls` carries no final `content`;
/// a tool message carries a single tool's result bound to
/// `tool_call_id`. Serialized with `content: null` and `tool_calls: []`
/// omitted when empty so round-tripped JSON stays compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, name: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, name: None }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, name: None }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None, name: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(output.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Parsed response from an LLM provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl LLMResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Per-tool-call observability record, assembled by the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDetail {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    /// First 120 characters of the tool's output.
    pub output_preview: String,
}

impl ToolCallDetail {
    pub fn new(name: impl Into<String>, success: bool, duration_ms: u64, output: &str) -> Self {
        let output_preview: String = output.chars().take(120).collect();
        Self { name: name.into(), success, duration_ms, output_preview }
    }
}

/// Result of one complete `Engine::run` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub response: String,
    pub iterations: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub tool_calls_made: Vec<String>,
    pub tool_details: Vec<ToolCallDetail>,
}

impl AgentRunResult {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn empty(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            iterations: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            tool_calls_made: Vec::new(),
            tool_details: Vec::new(),
        }
    }
}

/// Extra per-run handles threaded through tool execution: dry-run
/// flag, web-search API keys, and similar optional context that not
/// every tool needs. Kept as a loose string map rather than a fixed
/// struct since the set of tools (and what they need) is open-ended.
pub type ExtraContext = HashMap<String, serde_json::Value>;
