//! Single construction point for the active engine: reads
//! `config.agents.defaults.engine` and wires up the chosen
//! implementation with its tool registry, wrapped in the
//! [`TrackedEngine`]/[`LearningEngine`] decorators.

use crate::config::GripConfig;
use crate::memory::{KnowledgeBase, MemoryManager, PatternExtractor, SemanticCache};
use crate::security::{TokenTracker, TrustManager};
use crate::session::SessionManager;
use crate::subagent::SubagentManager;
use crate::tools::builtins::create_builtin_tools;
use crate::tools::ToolRegistry;
use std::path::Path;
use std::sync::Arc;

use super::{AgentLoop, Engine, LearningEngine, SdkEngine, TrackedEngine};

const SEMANTIC_CACHE_MAX_ENTRIES: usize = 500;

/// Construct the configured engine and wrap it with usage tracking and
/// behavioral learning. `state_dir` holds the daily token counter and
/// the knowledge base's backing files (distinct from the workspace,
/// same as the teacher's app-data split).
pub fn create_engine(
    config: Arc<GripConfig>,
    state_dir: impl AsRef<Path>,
    sessions: Arc<SessionManager>,
    memory: Arc<MemoryManager>,
    subagents: Arc<SubagentManager>,
    trust: Option<Arc<TrustManager>>,
    tool_registry: Option<Arc<ToolRegistry>>,
) -> Result<Arc<dyn Engine>, String> {
    let state_dir = state_dir.as_ref();

    let inner: Arc<dyn Engine> = match config.agents.defaults.engine.as_str() {
        "claude_sdk" => {
            log::info!("Using Claude Agent SDK engine");
            Arc::new(SdkEngine::new(config.clone(), sessions.clone(), memory.clone(), trust.clone()))
        }
        _ => {
            log::info!("Using LiteLLM-style agent loop engine");
            let provider = Arc::from(crate::providers::create_provider(&config)?);
            // `tool_registry` is populated with MCP-discovered tools by the
            // caller (see McpManager::connect_all) before this runs; builtins
            // are registered into that same instance so both sets dispatch
            // through one ToolRegistry.
            let registry = tool_registry.unwrap_or_else(|| Arc::new(ToolRegistry::new()));
            registry.register_many(create_builtin_tools(memory.clone(), subagents.clone(), trust.clone()));
            let cache = SemanticCache::new(
                state_dir.join("semantic_cache"),
                config.agents.defaults.semantic_cache_ttl,
                SEMANTIC_CACHE_MAX_ENTRIES,
                config.agents.defaults.semantic_cache_enabled,
            )
            .map_err(|e| format!("failed to open semantic cache: {e}"))?;
            Arc::new(
                AgentLoop::new(config.clone(), provider, registry, sessions.clone(), memory.clone())
                    .with_semantic_cache(Arc::new(cache)),
            )
        }
    };

    let tracker = Arc::new(
        TokenTracker::new(state_dir, config.agents.defaults.max_daily_tokens)
            .map_err(|e| format!("failed to open token tracker state: {e}"))?,
    );
    let tracked: Arc<dyn Engine> = Arc::new(TrackedEngine::new(inner, tracker));

    let knowledge_base = Arc::new(
        KnowledgeBase::new(state_dir.join("knowledge"))
            .map_err(|e| format!("failed to open knowledge base: {e}"))?,
    );
    let learning: Arc<dyn Engine> = Arc::new(LearningEngine::new(tracked, knowledge_base, PatternExtractor::new()));

    Ok(learning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_litellm_engine_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        config.agents.defaults.engine = "litellm".to_string();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let subagents = Arc::new(SubagentManager::new());

        let engine = create_engine(config, dir.path().join("state"), sessions, memory, subagents, None, None);
        assert!(engine.is_ok());
    }

    #[test]
    fn builds_sdk_engine_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        config.agents.defaults.engine = "claude_sdk".to_string();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let subagents = Arc::new(SubagentManager::new());

        let engine = create_engine(config, dir.path().join("state"), sessions, memory, subagents, None, None);
        assert!(engine.is_ok());
    }
}
