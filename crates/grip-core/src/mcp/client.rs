//! A single connected MCP server: transport-agnostic `initialize` /
//! `tools/list` / `tools/call` handshake and dispatch.

use super::transport::{HttpTransport, McpTransportHandle, SseTransport, StdioTransport};
use super::types::*;
use crate::config::schema::McpServerConfig as ConfigEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_TIMEOUT: u64 = 30;
const TOOL_CALL_TIMEOUT: u64 = 120;

/// A connected MCP client for a single server.
pub struct McpClient {
    pub server_name: String,
    pub config: ConfigEntry,
    transport: McpTransportHandle,
    next_id: AtomicU64,
    pub server_info: Mutex<Option<McpServerInfo>>,
    tools: Mutex<Vec<McpToolDef>>,
}

impl McpClient {
    /// Connect using whichever transport the config resolves to,
    /// perform the `initialize` handshake, and fetch the initial tool list.
    /// `bearer_token` is attached to HTTP/SSE transports before the
    /// handshake when the server requires OAuth; ignored for stdio.
    pub async fn connect(
        server_name: &str,
        config: ConfigEntry,
        bearer_token: Option<String>,
    ) -> Result<Self, String> {
        let kind = McpTransportKind::resolve(
            &config.transport_type,
            !config.url.is_empty(),
            !config.command.is_empty(),
        );
        log::info!("[mcp] connecting to '{server_name}' via {kind:?}");

        let transport = match kind {
            McpTransportKind::Stdio => {
                if config.command.is_empty() {
                    return Err("stdio transport requires a command".to_string());
                }
                let t = StdioTransport::spawn(&config.command, &config.args, &config.env).await?;
                McpTransportHandle::Stdio(t)
            }
            McpTransportKind::Http => {
                if config.url.is_empty() {
                    return Err("http transport requires a url".to_string());
                }
                McpTransportHandle::Http(HttpTransport::new(config.url.clone(), config.headers.clone()))
            }
            McpTransportKind::Sse => {
                if config.url.is_empty() {
                    return Err("sse transport requires a url".to_string());
                }
                McpTransportHandle::Sse(SseTransport::new(config.url.clone(), config.headers.clone()))
            }
        };

        let client = McpClient {
            server_name: server_name.to_string(),
            config,
            transport,
            next_id: AtomicU64::new(1),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        };

        if bearer_token.is_some() {
            client.set_bearer_token(bearer_token).await;
        }
        client.initialize().await?;
        client.refresh_tools().await?;
        Ok(client)
    }

    /// Attach a bearer token for OAuth-protected HTTP/SSE servers. A
    /// no-op on stdio transports.
    pub async fn set_bearer_token(&self, token: Option<String>) {
        self.transport.set_bearer_token(token).await;
    }

    async fn initialize(&self) -> Result<(), String> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: McpClientCapabilities::default(),
            client_info: McpClientInfo {
                name: "grip".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let req = JsonRpcRequest::new(
            self.next_id(),
            "initialize",
            Some(serde_json::to_value(&params).map_err(|e| e.to_string())?),
        );
        let resp = self.transport.send_request(req, DEFAULT_TIMEOUT).await?;
        if let Some(err) = resp.error {
            return Err(format!("MCP initialize failed: {} (code={})", err.message, err.code));
        }
        if let Some(result) = resp.result {
            let init: InitializeResult =
                serde_json::from_value(result).map_err(|e| format!("parse init result: {e}"))?;
            log::info!(
                "[mcp] '{}' initialized (protocol={})",
                self.server_name,
                init.protocol_version
            );
            *self.server_info.lock() = init.server_info;
        }
        self.transport.send_notification("notifications/initialized", None).await?;
        Ok(())
    }

    pub async fn refresh_tools(&self) -> Result<(), String> {
        let req = JsonRpcRequest::new(self.next_id(), "tools/list", None);
        let resp = self.transport.send_request(req, DEFAULT_TIMEOUT).await?;

        if let Some(err) = resp.error {
            if err.code == -32601 {
                log::info!("[mcp] '{}' does not expose tools", self.server_name);
                *self.tools.lock() = Vec::new();
                return Ok(());
            }
            return Err(format!("tools/list failed: {} (code={})", err.message, err.code));
        }

        let list: ToolsListResult = match resp.result {
            Some(result) => {
                serde_json::from_value(result).map_err(|e| format!("parse tools/list: {e}"))?
            }
            None => ToolsListResult::default(),
        };
        log::info!("[mcp] '{}' exposes {} tools", self.server_name, list.tools.len());
        *self.tools.lock() = list.tools;
        Ok(())
    }

    pub fn tools(&self) -> Vec<McpToolDef> {
        self.tools.lock().clone()
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, String> {
        let params = ToolCallParams { name: tool_name.to_string(), arguments };
        let req = JsonRpcRequest::new(
            self.next_id(),
            "tools/call",
            Some(serde_json::to_value(&params).map_err(|e| e.to_string())?),
        );
        let resp = self.transport.send_request(req, TOOL_CALL_TIMEOUT).await?;

        if let Some(err) = resp.error {
            return Err(format!("tools/call '{tool_name}' failed: {} (code={})", err.message, err.code));
        }
        let result_val = resp.result.ok_or_else(|| format!("tools/call '{tool_name}': empty result"))?;
        let tool_result: ToolCallResult =
            serde_json::from_value(result_val).map_err(|e| format!("parse tools/call result: {e}"))?;

        if tool_result.is_error {
            return Err(extract_text_content(&tool_result.content));
        }
        Ok(extract_text_content(&tool_result.content))
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn shutdown(&self) {
        log::info!("[mcp] shutting down '{}'", self.server_name);
        self.transport.shutdown().await;
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}
