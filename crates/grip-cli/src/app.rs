//! Wires together one shared [`grip_core`] stack — config, sessions,
//! memory, trust, MCP, and the configured engine — for every CLI
//! subcommand to reuse. Built once per invocation in `main`.

use async_trait::async_trait;
use grip_core::config::{load_config, GripConfig};
use grip_core::engine::{create_engine, Engine};
use grip_core::mcp::McpManager;
use grip_core::memory::MemoryManager;
use grip_core::security::{TokenStore, TrustManager, TrustPrompt};
use grip_core::session::SessionManager;
use grip_core::subagent::SubagentManager;
use grip_core::tools::ToolRegistry;
use grip_core::workflow::WorkflowStore;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prompts the user on the controlling terminal before trusting a
/// directory outside the workspace. Reads are blocking, bounced onto
/// a blocking thread so they don't stall the tokio runtime.
pub struct CliTrustPrompt;

#[async_trait]
impl TrustPrompt for CliTrustPrompt {
    async fn ask(&self, path: &Path) -> bool {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            print!("grip wants to access '{}', which is outside the workspace. Trust it? [y/N] ", path.display());
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }
}

fn grip_home() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".grip")
}

/// Every handle a CLI subcommand might need, assembled once in `main`.
pub struct AppContext {
    pub config: Arc<GripConfig>,
    pub workspace: PathBuf,
    pub sessions: Arc<SessionManager>,
    pub memory: Arc<MemoryManager>,
    pub subagents: Arc<SubagentManager>,
    pub trust: Arc<TrustManager>,
    pub mcp: Arc<McpManager>,
    pub engine: Arc<dyn Engine>,
    pub workflow_store: Arc<WorkflowStore>,
    pub workflow_engine: grip_core::workflow::WorkflowEngine,
}

impl AppContext {
    pub async fn build(config_path: Option<&Path>) -> Result<Self, String> {
        let config = Arc::new(load_config(config_path).map_err(|e| e.to_string())?);
        let workspace = config.agents.defaults.workspace.clone();
        std::fs::create_dir_all(&workspace).map_err(|e| format!("failed to create workspace: {e}"))?;

        let sessions = Arc::new(
            SessionManager::new(workspace.join("sessions")).map_err(|e| e.to_string())?,
        );
        let memory = Arc::new(MemoryManager::new(&workspace).map_err(|e| e.to_string())?);
        let subagents = Arc::new(SubagentManager::new());

        let mut trust_manager = TrustManager::new(grip_home());
        trust_manager.set_prompt(Arc::new(CliTrustPrompt));
        let trust = Arc::new(trust_manager);

        let tool_registry = Arc::new(ToolRegistry::new());
        let mcp_token_store = Arc::new(TokenStore::new(grip_home().join("mcp_tokens.json")));
        let mcp = Arc::new(McpManager::new(tool_registry.clone(), mcp_token_store));
        let connected = mcp.connect_all(&config).await;
        log::info!("Connected to {connected} MCP server(s)");

        let state_dir = workspace.join("state");
        let engine = create_engine(
            config.clone(),
            state_dir,
            sessions.clone(),
            memory.clone(),
            subagents.clone(),
            Some(trust.clone()),
            Some(tool_registry),
        )?;

        let workflow_store = Arc::new(
            WorkflowStore::new(workspace.join("workflows")).map_err(|e| e.to_string())?,
        );
        let workflow_engine = grip_core::workflow::WorkflowEngine::new(config.clone(), engine.clone());

        Ok(Self {
            config,
            workspace,
            sessions,
            memory,
            subagents,
            trust,
            mcp,
            engine,
            workflow_store,
            workflow_engine,
        })
    }
}
