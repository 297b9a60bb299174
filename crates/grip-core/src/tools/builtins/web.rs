//! `fetch`: a plain HTTP GET tool backed by a shared `reqwest` client.

use crate::tools::base::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const MAX_BODY_BYTES: usize = 50_000;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct FetchTool;

#[async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Make an HTTP GET request to a URL and return its response body."
    }

    fn category(&self) -> &str {
        "web"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL to fetch"},
                "headers": {"type": "object", "description": "Optional HTTP headers as key-value pairs"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: &Value, _ctx: &ToolContext) -> String {
        let Some(url) = params["url"].as_str() else {
            return "Error: missing 'url' argument".to_string();
        };

        let client = match reqwest::Client::builder().timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS)).build() {
            Ok(c) => c,
            Err(e) => return format!("Error: failed to build HTTP client: {e}"),
        };

        let mut req = client.get(url);
        if let Some(headers) = params["headers"].as_object() {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    req = req.header(key.as_str(), v);
                }
            }
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => return format!("Error fetching '{url}': {e}"),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return format!("Error reading response body from '{url}': {e}"),
        };

        let truncated = if body.len() > MAX_BODY_BYTES {
            format!("{}...\n[truncated, {} total bytes]", &body[..MAX_BODY_BYTES], body.len())
        } else {
            body
        };

        format!("HTTP {} {}\n\n{}", status.as_u16(), if status.is_success() { "OK" } else { "Error" }, truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_requires_url() {
        let tool = FetchTool;
        let schema = tool.parameters();
        assert_eq!(schema["required"][0], "url");
    }

    #[tokio::test]
    async fn missing_url_is_reported() {
        let tool = FetchTool;
        let ctx = ToolContext::new(std::env::temp_dir());
        let out = tool.execute(&json!({}), &ctx).await;
        assert!(out.starts_with("Error"));
    }
}
