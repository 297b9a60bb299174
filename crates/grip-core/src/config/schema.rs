//! Configuration schema for the whole platform. Mirrors the JSON
//! written to `~/.grip/config.json`; every field has a default so a
//! missing file yields a fully runnable configuration.

use super::secret::Secret;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

fn default_workspace() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".grip").join("workspace")
}

fn default_model() -> String {
    "openrouter/anthropic/claude-sonnet-4".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self { os: detect_os(), arch: detect_arch() }
    }
}

fn detect_os() -> String {
    std::env::consts::OS.to_string()
}

fn detect_arch() -> String {
    match std::env::consts::ARCH {
        "aarch64" => "arm64".to_string(),
        "x86_64" => "x86_64".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub workspace: PathBuf,
    pub model: String,
    pub provider: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_tool_iterations: u32,
    pub memory_window: u32,
    pub auto_consolidate: bool,
    pub consolidation_model: String,
    pub enable_self_correction: bool,
    pub semantic_cache_enabled: bool,
    pub semantic_cache_ttl: u64,
    pub max_daily_tokens: u64,
    pub dry_run: bool,
    pub engine: String,
    pub sdk_model: String,
    pub sdk_permission_mode: String,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: default_model(),
            provider: String::new(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 15,
            memory_window: 20,
            auto_consolidate: true,
            consolidation_model: String::new(),
            enable_self_correction: true,
            semantic_cache_enabled: true,
            semantic_cache_ttl: 3600,
            max_daily_tokens: 0,
            dry_run: false,
            engine: "claude_sdk".to_string(),
            sdk_model: "claude-sonnet-4-6".to_string(),
            sdk_permission_mode: "acceptEdits".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTiersConfig {
    pub enabled: bool,
    pub low: String,
    pub medium: String,
    pub high: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    pub api_key: Secret,
    pub api_base: String,
    pub default_model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEntry {
    pub enabled: bool,
    pub token: Secret,
    pub allow_from: Vec<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: ChannelEntry,
    pub discord: ChannelEntry,
    pub slack: ChannelEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchProvider {
    pub enabled: bool,
    pub api_key: Secret,
    pub max_results: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub brave: WebSearchProvider,
    pub duckduckgo: WebSearchProvider,
    pub perplexity: WebSearchProvider,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            brave: WebSearchProvider::default(),
            duckduckgo: WebSearchProvider { enabled: true, max_results: 5, ..Default::default() },
            perplexity: WebSearchProvider::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub url: String,
    pub headers: HashMap<String, String>,
    #[serde(rename = "type")]
    pub transport_type: String,
    pub allowed_tools: Vec<String>,
    pub timeout: u64,
    pub enabled: bool,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub web: WebSearchConfig,
    pub shell_timeout: u64,
    pub restrict_to_workspace: bool,
    pub trust_mode: String,
    pub mcp_servers: HashMap<String, McpServerConfig>,
    pub enable_tool_search: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web: WebSearchConfig::default(),
            shell_timeout: 60,
            restrict_to_workspace: false,
            trust_mode: "prompt".to_string(),
            mcp_servers: HashMap::new(),
            enable_tool_search: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub reply_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    pub exec_timeout_minutes: u32,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self { exec_timeout_minutes: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub auth_token: Secret,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_minute_per_ip: u32,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_body_bytes: u64,
    pub enable_tool_execute: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_token: Secret::default(),
            rate_limit_per_minute: 60,
            rate_limit_per_minute_per_ip: 30,
            cors_allowed_origins: Vec::new(),
            max_request_body_bytes: 1_048_576,
            enable_tool_execute: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub api: ApiConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8420, api: ApiConfig::default() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub model: String,
    pub max_tokens: u32,
    #[serde(default = "default_unset_temperature")]
    pub temperature: f64,
    pub max_tool_iterations: u32,
    pub tools_allowed: Vec<String>,
    pub tools_denied: Vec<String>,
    pub system_prompt_file: String,
}

fn default_unset_temperature() -> f64 {
    -1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
    pub model_tiers: ModelTiersConfig,
    pub profiles: HashMap<String, AgentProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GripConfig {
    pub platform: PlatformInfo,
    pub agents: AgentsConfig,
    pub providers: HashMap<String, ProviderEntry>,
    pub channels: ChannelsConfig,
    pub tools: ToolsConfig,
    pub heartbeat: HeartbeatConfig,
    pub cron: CronConfig,
    pub gateway: GatewayConfig,
}
