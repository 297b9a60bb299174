//! The provider trait itself. Each adapter translates between grip's
//! internal `Message`/`LLMResponse` and its own wire format.

use crate::error::GripResult;
use crate::types::{LLMResponse, Message};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ChatParams {
    pub model: Option<String>,
    pub tools: Option<Vec<Value>>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request and return the parsed response.
    async fn chat(&self, messages: &[Message], params: &ChatParams) -> GripResult<LLMResponse>;

    /// Whether this provider supports function/tool calling.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Human-readable provider name, used in error messages and logs.
    fn name(&self) -> &str;
}
