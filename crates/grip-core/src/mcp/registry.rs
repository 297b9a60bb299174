//! The MCP manager: owns every connected server, wraps their tools
//! into the shared [`ToolRegistry`], and drives the OAuth login paths
//! (401 detection, stored-token reuse, blocking CLI login, and the
//! gateway-mediated login/callback split).

use super::client::McpClient;
use super::types::{McpServerStatus, McpToolDef};
use crate::config::schema::{GripConfig, McpServerConfig as ConfigEntry};
use crate::security::{OAuthFlow, StoredToken, TokenStore};
use crate::tools::base::{Tool, ToolContext, ToolRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A grip [`Tool`] that delegates execution to one MCP server tool.
struct McpWrappedTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    client: Arc<McpClient>,
    raw_tool_name: String,
}

#[async_trait]
impl Tool for McpWrappedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    fn category(&self) -> &str {
        "mcp"
    }

    async fn execute(&self, params: &serde_json::Value, _ctx: &ToolContext) -> String {
        match self.client.call_tool(&self.raw_tool_name, params.clone()).await {
            Ok(text) => text,
            Err(e) => format!("Error calling MCP tool '{}' on '{}': {e}", self.raw_tool_name, self.client.server_name),
        }
    }
}

fn mcp_tool_name(server_name: &str, tool: &McpToolDef) -> String {
    format!("mcp_{server_name}_{}", tool.name)
}

fn wrap_tool(server_name: &str, client: &Arc<McpClient>, tool: McpToolDef) -> Arc<dyn Tool> {
    let name = mcp_tool_name(server_name, &tool);
    let description = format!(
        "{} [MCP: {server_name}]",
        tool.description.as_deref().unwrap_or("(no description)")
    );
    Arc::new(McpWrappedTool {
        name,
        description,
        parameters: tool.input_schema,
        client: client.clone(),
        raw_tool_name: tool.name,
    })
}

struct ConnectedServer {
    client: Arc<McpClient>,
    registered_tool_names: Vec<String>,
}

/// Manages the lifecycle of every configured MCP server: connect,
/// disconnect, reconnect, and tool dispatch through the shared
/// [`ToolRegistry`].
pub struct McpManager {
    servers: parking_lot::Mutex<HashMap<String, ConnectedServer>>,
    registry: Arc<ToolRegistry>,
    token_store: Arc<TokenStore>,
}

impl McpManager {
    pub fn new(registry: Arc<ToolRegistry>, token_store: Arc<TokenStore>) -> Self {
        Self { servers: parking_lot::Mutex::new(HashMap::new()), registry, token_store }
    }

    /// Connect every enabled server in `config.tools.mcp_servers`.
    /// Per-server failures are logged and skipped rather than aborting
    /// the whole startup sequence. Returns the number of servers that
    /// connected successfully.
    pub async fn connect_all(&self, config: &GripConfig) -> usize {
        let mut connected = 0;
        for (name, entry) in &config.tools.mcp_servers {
            if !entry.enabled {
                continue;
            }
            match self.connect_one(name, entry.clone()).await {
                Ok(()) => connected += 1,
                Err(e) => log::error!("[mcp] failed to connect '{name}': {e}"),
            }
        }
        connected
    }

    /// Connect a single server, resolving OAuth state first. Returns
    /// `Err("OAuth login required")` without attempting a connection
    /// when the server requires OAuth and no token is stored — the
    /// caller (gateway `/status`) surfaces this as `AuthRequired`.
    pub async fn connect_one(&self, name: &str, entry: ConfigEntry) -> Result<(), String> {
        let bearer = self.resolve_bearer_token(name, &entry).await?;

        if let Some(old) = self.servers.lock().remove(name) {
            old.client.shutdown().await;
            self.unregister_tools(&old.registered_tool_names);
        }

        let client = Arc::new(McpClient::connect(name, entry, bearer).await?);
        let tool_defs = client.tools();
        let mut registered_tool_names = Vec::with_capacity(tool_defs.len());
        for tool in tool_defs {
            let wrapped = wrap_tool(name, &client, tool);
            registered_tool_names.push(wrapped.name().to_string());
            self.registry.register(wrapped);
        }

        log::info!("[mcp] '{name}' connected with {} tools", registered_tool_names.len());
        self.servers.lock().insert(name.to_string(), ConnectedServer { client, registered_tool_names });
        Ok(())
    }

    async fn resolve_bearer_token(
        &self,
        name: &str,
        entry: &ConfigEntry,
    ) -> Result<Option<String>, String> {
        let Some(oauth_cfg) = &entry.oauth else { return Ok(None) };

        let Some(mut token) = self.token_store.get(name) else {
            return Err("OAuth login required".to_string());
        };

        if token.is_expired() {
            if token.refresh_token.is_empty() {
                return Err("OAuth login required".to_string());
            }
            let flow = OAuthFlow::new(oauth_cfg.clone(), name);
            token = flow
                .refresh(&token.refresh_token)
                .await
                .map_err(|e| format!("OAuth token refresh failed: {e}"))?;
            self.token_store.save(name, token.clone())?;
        }

        Ok(Some(token.access_token))
    }

    fn unregister_tools(&self, names: &[String]) {
        for name in names {
            self.registry.unregister(name);
        }
    }

    pub async fn disconnect(&self, name: &str) {
        if let Some(server) = self.servers.lock().remove(name) {
            server.client.shutdown().await;
            self.unregister_tools(&server.registered_tool_names);
        }
    }

    pub async fn disconnect_all(&self) {
        let names: Vec<String> = self.servers.lock().keys().cloned().collect();
        for name in names {
            self.disconnect(&name).await;
        }
    }

    pub async fn reconnect_server(&self, name: &str, entry: ConfigEntry) -> Result<(), String> {
        self.connect_one(name, entry).await
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.servers.lock().contains_key(name)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.servers.lock().keys().cloned().collect()
    }

    /// Status of every server named in `config`, per §6's `Connected |
    /// Disconnected | AuthRequired | Disabled` surface.
    pub fn status_list(&self, config: &GripConfig) -> Vec<(String, McpServerStatus)> {
        let servers = self.servers.lock();
        config
            .tools
            .mcp_servers
            .keys()
            .map(|name| {
                let status = if !config.tools.mcp_servers[name].enabled {
                    McpServerStatus::Disabled
                } else if servers.contains_key(name) {
                    McpServerStatus::Connected
                } else if config.tools.mcp_servers[name].oauth.is_some()
                    && self.token_store.get(name).is_none()
                {
                    McpServerStatus::AuthRequired
                } else {
                    McpServerStatus::Disconnected
                };
                (name.clone(), status)
            })
            .collect()
    }

    /// Run the full blocking browser-based OAuth flow for a server
    /// (used by the CLI's `mcp login` command) and persist the token.
    pub async fn login_blocking(&self, name: &str, oauth_cfg: crate::config::schema::OAuthConfig) -> Result<StoredToken, String> {
        let flow = OAuthFlow::new(oauth_cfg, name);
        let token = flow.execute().await?;
        self.token_store.save(name, token.clone())?;
        Ok(token)
    }

    /// Build the auth URL half of a gateway-mediated login: register
    /// the flow under `pending` keyed by its CSRF state and return the
    /// URL the caller should redirect the user's browser to.
    pub fn begin_gateway_login(
        &self,
        name: &str,
        oauth_cfg: crate::config::schema::OAuthConfig,
        pending: &crate::security::PendingOAuthStates,
    ) -> String {
        let flow = OAuthFlow::new(oauth_cfg, name);
        let url = flow.build_auth_url();
        pending.insert(flow);
        url
    }

    /// Complete a gateway-mediated login: exchange `code` using the
    /// flow stashed under `state`, then persist the resulting token.
    pub async fn complete_gateway_login(
        &self,
        state: &str,
        code: &str,
        pending: &crate::security::PendingOAuthStates,
    ) -> Result<String, String> {
        let flow = pending.take(state).ok_or("Unknown or expired OAuth state")?;
        let server_name = flow.server_name().to_string();
        let token = flow.exchange(code).await?;
        self.token_store.save(&server_name, token)?;
        Ok(server_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::McpServerConfig;

    fn registry_and_store() -> (Arc<ToolRegistry>, Arc<TokenStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let store = Arc::new(TokenStore::new(dir.path().join("mcp_tokens.json")));
        (registry, store, dir)
    }

    #[test]
    fn mcp_tool_name_is_namespaced() {
        let tool = McpToolDef {
            name: "read_file".to_string(),
            description: Some("Read a file".to_string()),
            input_schema: serde_json::json!({"type": "object"}),
        };
        assert_eq!(mcp_tool_name("github", &tool), "mcp_github_read_file");
    }

    #[tokio::test]
    async fn status_list_reports_disabled_and_auth_required() {
        let (registry, store, _dir) = registry_and_store();
        let manager = McpManager::new(registry, store);

        let mut config = GripConfig::default();
        config.tools.mcp_servers.insert(
            "disabled-one".to_string(),
            McpServerConfig { enabled: false, ..Default::default() },
        );
        config.tools.mcp_servers.insert(
            "needs-auth".to_string(),
            McpServerConfig {
                enabled: true,
                oauth: Some(crate::config::schema::OAuthConfig::default()),
                ..Default::default()
            },
        );

        let statuses: std::collections::HashMap<_, _> = manager.status_list(&config).into_iter().collect();
        assert_eq!(statuses["disabled-one"], McpServerStatus::Disabled);
        assert_eq!(statuses["needs-auth"], McpServerStatus::AuthRequired);
    }

    #[tokio::test]
    async fn connect_one_without_command_or_url_fails() {
        let (registry, store, _dir) = registry_and_store();
        let manager = McpManager::new(registry, store);
        let result = manager.connect_one("broken", McpServerConfig::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn gateway_login_round_trips_state() {
        let (registry, store, _dir) = registry_and_store();
        let manager = McpManager::new(registry, store.clone());
        let pending = crate::security::PendingOAuthStates::new();

        let oauth_cfg = crate::config::schema::OAuthConfig {
            client_id: "abc".to_string(),
            auth_url: "https://example.com/authorize".to_string(),
            token_url: "https://example.com/token".to_string(),
            scopes: vec![],
            redirect_port: 0,
        };
        let url = manager.begin_gateway_login("svc", oauth_cfg, &pending);
        assert!(url.starts_with("https://example.com/authorize?"));
        assert_eq!(pending.len(), 1);
    }
}
