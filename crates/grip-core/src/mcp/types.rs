//! MCP protocol types: JSON-RPC framing and the `initialize` /
//! `tools/list` / `tools/call` message shapes. Spec:
//! <https://spec.modelcontextprotocol.io/>.

use serde::{Deserialize, Serialize};

/// MCP protocol version grip advertises in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, method: method.to_string(), params }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: McpClientCapabilities,
    pub client_info: McpClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default)]
    pub server_info: Option<McpServerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<McpToolDef>,
}

/// A single tool exposed by an MCP server, as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_empty_schema")]
    pub input_schema: serde_json::Value,
}

fn default_empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McpContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "resource")]
    Resource { resource: serde_json::Value },
}

/// Concatenate every text block of a `tools/call` result, per §4.5's
/// "extracts text blocks... and concatenates them".
pub fn extract_text_content(content: &[McpContent]) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            McpContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transport kind resolved from `McpServerConfig`, per §4.5: stdio,
/// HTTP streamable (`type=http`), or SSE (`type=sse`, or unset with a URL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    Stdio,
    Http,
    Sse,
}

impl McpTransportKind {
    pub fn resolve(transport_type: &str, has_url: bool, has_command: bool) -> Self {
        match transport_type {
            "http" => McpTransportKind::Http,
            "sse" => McpTransportKind::Sse,
            "stdio" => McpTransportKind::Stdio,
            _ if has_url => McpTransportKind::Sse,
            _ if has_command => McpTransportKind::Stdio,
            _ => McpTransportKind::Stdio,
        }
    }
}

/// Runtime status of a configured MCP server, per §6's gateway surface:
/// `Connected | Disconnected | AuthRequired | Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerStatus {
    Connected,
    Disconnected,
    AuthRequired,
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonrpc_request_omits_none_params() {
        let req = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn tool_def_defaults_empty_schema() {
        let json = r#"{"name":"ping"}"#;
        let tool: McpToolDef = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn extract_text_concatenates_and_skips_non_text() {
        let content = vec![
            McpContent::Text { text: "a".into() },
            McpContent::Image { data: "x".into(), mime_type: "image/png".into() },
            McpContent::Text { text: "b".into() },
        ];
        assert_eq!(extract_text_content(&content), "a\nb");
    }

    #[test]
    fn transport_kind_resolution() {
        assert_eq!(McpTransportKind::resolve("http", true, false), McpTransportKind::Http);
        assert_eq!(McpTransportKind::resolve("sse", true, false), McpTransportKind::Sse);
        assert_eq!(McpTransportKind::resolve("", true, false), McpTransportKind::Sse);
        assert_eq!(McpTransportKind::resolve("", false, true), McpTransportKind::Stdio);
    }
}
