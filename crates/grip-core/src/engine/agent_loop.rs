//! The provider-agnostic engine: the LLM/tool iteration cycle that
//! drives every non-SDK run. Orchestrates system-prompt assembly,
//! relevant-memory retrieval, the tool-call round trip, self-correction
//! nudges, session persistence, and consolidation.

use crate::config::GripConfig;
use crate::context::ContextBuilder;
use crate::error::GripResult;
use crate::memory::{KnowledgeBase, MemoryManager, SemanticCache};
use crate::providers::{ChatParams, LLMProvider};
use crate::router::{classify_complexity, select_model};
use crate::session::{Session, SessionManager};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{AgentRunResult, ExtraContext, Message, ToolCall, ToolCallDetail};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use super::Engine;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_SECS: u64 = 1;
/// Hard cap on verbatim recent history sent to the model, independent
/// of the configured memory window, so a single run never balloons.
const IMMEDIATE_WINDOW_CAP: usize = 10;
/// Consecutive identical `(tool_name, arguments)` dispatches before the
/// loop gives up and short-circuits to exhaustion handling.
const MAX_REPEATED_TOOL_CALLS: u32 = 3;

/// Fingerprint a round's tool calls (sorted by name so call order
/// doesn't matter) so repeated rounds can be detected without storing
/// the full call history.
fn tool_call_signature(tool_calls: &[ToolCall]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut parts: Vec<(String, String)> = tool_calls
        .iter()
        .map(|tc| (tc.function_name.clone(), serde_json::to_string(&tc.arguments).unwrap_or_default()))
        .collect();
    parts.sort();

    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

/// Result of running a single tool call, before it is folded into the
/// conversation and the run's aggregate metrics.
struct ToolExecutionResult {
    tool_call_id: String,
    tool_name: String,
    output: String,
    success: bool,
    duration_ms: u64,
}

/// The provider-agnostic agent loop: send messages + tool schemas to
/// an [`LLMProvider`], execute any requested tools, and repeat until
/// the model returns plain text or `max_tool_iterations` is reached.
pub struct AgentLoop {
    config: Arc<GripConfig>,
    provider: Arc<dyn LLMProvider>,
    context_builder: ContextBuilder,
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionManager>,
    memory: Arc<MemoryManager>,
    semantic_cache: Option<Arc<SemanticCache>>,
    knowledge_base: Option<Arc<KnowledgeBase>>,
}

impl AgentLoop {
    pub fn new(
        config: Arc<GripConfig>,
        provider: Arc<dyn LLMProvider>,
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionManager>,
        memory: Arc<MemoryManager>,
    ) -> Self {
        let workspace = config.agents.defaults.workspace.clone();
        Self {
            config,
            provider,
            context_builder: ContextBuilder::new(workspace),
            registry,
            sessions,
            memory,
            semantic_cache: None,
            knowledge_base: None,
        }
    }

    pub fn with_semantic_cache(mut self, cache: Arc<SemanticCache>) -> Self {
        self.semantic_cache = Some(cache);
        self
    }

    pub fn with_knowledge_base(mut self, kb: Arc<KnowledgeBase>) -> Self {
        self.knowledge_base = Some(kb);
        self
    }

    fn effective_model(
        &self,
        requested: Option<&str>,
        user_message: &str,
        tool_calls_in_session: usize,
        message_count_in_session: usize,
    ) -> String {
        let defaults = &self.config.agents.defaults;
        if let Some(m) = requested {
            return m.to_string();
        }
        let tiers = &self.config.agents.model_tiers;
        if tiers.enabled {
            let complexity = classify_complexity(user_message, tool_calls_in_session, message_count_in_session);
            select_model(complexity, tiers, &defaults.model)
        } else {
            defaults.model.clone()
        }
    }

    fn build_tool_context(&self, session_key: &str) -> ToolContext {
        let defaults = &self.config.agents.defaults;
        let tools_cfg = &self.config.tools;
        let mut extra = ExtraContext::new();
        if tools_cfg.web.brave.enabled && !tools_cfg.web.brave.api_key.expose().is_empty() {
            extra.insert("brave_api_key".to_string(), serde_json::Value::String(tools_cfg.web.brave.api_key.expose().to_string()));
        }
        if defaults.dry_run {
            extra.insert("dry_run".to_string(), serde_json::Value::Bool(true));
        }
        ToolContext {
            workspace_path: defaults.workspace.clone(),
            restrict_to_workspace: tools_cfg.restrict_to_workspace,
            shell_timeout: tools_cfg.shell_timeout,
            session_key: session_key.to_string(),
            extra,
        }
    }

    /// Infinite-context retrieval: scores MEMORY.md, HISTORY.md, and the
    /// knowledge base against `query` and returns a compact system
    /// message, or an empty string when nothing scores.
    fn retrieve_relevant_context(&self, query: &str) -> String {
        let mut parts = Vec::new();

        let memory_hits = self.memory.search_memory(query, 5, "");
        if !memory_hits.is_empty() {
            let block: String = memory_hits.iter().map(|h| format!("- {h}")).collect::<Vec<_>>().join("\n");
            parts.push(format!("[Relevant facts from long-term memory]\n{block}"));
        }

        let history_hits = self.memory.search_history(query, 5, 0.05);
        if !history_hits.is_empty() {
            let block: String = history_hits.iter().map(|h| format!("- {h}")).collect::<Vec<_>>().join("\n");
            parts.push(format!("[Relevant past conversations]\n{block}"));
        }

        if let Some(kb) = &self.knowledge_base {
            let kb_hits = kb.search(query, "", 3);
            if !kb_hits.is_empty() {
                let block: String =
                    kb_hits.iter().map(|e| format!("- [{}] {}", e.category, e.content)).collect::<Vec<_>>().join("\n");
                parts.push(format!("[Learned patterns]\n{block}"));
            }
        }

        parts.join("\n\n")
    }

    async fn call_llm(&self, messages: &[Message], params: &ChatParams) -> GripResult<crate::types::LLMResponse> {
        let provider_name = self.provider.name().to_string();
        let mut attempt = 0;
        loop {
            match self.provider.chat(messages, params).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let retryable = err.is_retryable();
                    attempt += 1;
                    if !retryable || attempt >= MAX_RETRIES {
                        log::error!("LLM call to {provider_name} failed (attempt {attempt}/{MAX_RETRIES}): {err}");
                        return Err(err);
                    }
                    let delay = BASE_DELAY_SECS * (1 << (attempt - 1));
                    log::warn!("LLM call to {provider_name} failed (attempt {attempt}/{MAX_RETRIES}), retrying in {delay}s: {err}");
                    tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
                }
            }
        }
    }

    async fn execute_tool_call(&self, tc: &ToolCall, ctx: &ToolContext) -> ToolExecutionResult {
        log::info!("Executing tool: {}", tc.function_name);
        let start = Instant::now();
        let output = self.registry.execute(&tc.function_name, &tc.arguments, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let success = !output.starts_with("Error:");
        ToolExecutionResult { tool_call_id: tc.id.clone(), tool_name: tc.function_name.clone(), output, success, duration_ms }
    }

    fn persist_session(&self, mut session: Session, user_message: &str, assistant_response: &str) {
        session.add_message(Message::user(user_message));
        session.add_message(Message::assistant_text(assistant_response));
        if let Err(e) = self.sessions.save(&session) {
            log::error!("Failed to save session '{}': {e}", session.key);
        }
        let _ = self.memory.append_history(&format!("User: {}", truncate(user_message, 200)));
        let _ = self.memory.append_history(&format!("Assistant: {}", truncate(assistant_response, 200)));
    }

    /// Check the consolidation threshold and run it if crossed. Never
    /// fails the turn — consolidation errors are logged and swallowed.
    async fn maybe_consolidate(&self, session: &mut Session) {
        let defaults = &self.config.agents.defaults;
        if !defaults.auto_consolidate {
            return;
        }
        if !self.memory.needs_consolidation(session.message_count(), defaults.memory_window as usize) {
            return;
        }
        self.run_consolidation(session).await;
    }

    async fn run_consolidation(&self, session: &mut Session) {
        let defaults = &self.config.agents.defaults;
        let old_messages = session.get_old_messages(defaults.memory_window as usize).to_vec();
        if old_messages.is_empty() {
            return;
        }
        let model = if defaults.consolidation_model.is_empty() { defaults.model.clone() } else { defaults.consolidation_model.clone() };
        log::info!("Consolidating session '{}': {} old messages using model '{model}'", session.key, old_messages.len());
        match self.memory.consolidate(&old_messages, self.provider.as_ref(), &model).await {
            Ok(facts) => {
                if !facts.is_empty() && !facts.to_lowercase().contains("no new facts") {
                    session.summary = Some(format!("[Previous conversation context]\n{facts}"));
                }
                let pruned = session.prune_to_window(defaults.memory_window as usize);
                if let Err(e) = self.sessions.save(session) {
                    log::error!("Failed to save consolidated session '{}': {e}", session.key);
                }
                log::info!("Consolidation complete: pruned {pruned} messages");
            }
            Err(e) => log::error!("Memory consolidation failed (non-fatal): {e}"),
        }
    }
}

#[async_trait]
impl Engine for AgentLoop {
    async fn run(&self, user_message: &str, session_key: &str, model: Option<&str>) -> GripResult<AgentRunResult> {
        let lock = self.sessions.lock_for(session_key);
        let _guard = lock.lock().await;

        let defaults = &self.config.agents.defaults;
        let session = self.sessions.get_or_create(session_key);

        let effective_model =
            self.effective_model(model, user_message, session.tool_call_count(), session.message_count());

        if let Some(cache) = &self.semantic_cache {
            if let Some(cached) = cache.get(user_message, &effective_model) {
                log::info!("Semantic cache hit for session '{session_key}' — returning cached response");
                self.persist_session(session, user_message, &cached);
                return Ok(AgentRunResult::empty(cached));
            }
        }

        let immediate_window = (defaults.memory_window as usize).min(IMMEDIATE_WINDOW_CAP);
        let history: Vec<Message> = session.get_recent(immediate_window).to_vec();
        let session_summary = session.summary.clone();

        let tool_defs = self.registry.get_definitions();
        let system_text = self.context_builder.build(session_key, user_message, "");

        let mut messages = vec![Message::system(system_text)];
        if let Some(summary) = session_summary {
            messages.push(Message::system(summary));
        }
        let relevant = self.retrieve_relevant_context(user_message);
        if !relevant.is_empty() {
            messages.push(Message::system(relevant));
        }
        messages.extend(history);
        messages.push(Message::user(user_message));

        let tools = if tool_defs.is_empty() { None } else { Some(tool_defs) };
        let tool_ctx = self.build_tool_context(session_key);

        let mut total_prompt_tokens = 0u64;
        let mut total_completion_tokens = 0u64;
        let mut all_tool_calls: Vec<String> = Vec::new();
        let mut all_tool_details: Vec<ToolCallDetail> = Vec::new();
        let mut last_tool_signature: Option<u64> = None;
        let mut repeated_signature_count: u32 = 0;
        let mut reached_iteration = defaults.max_tool_iterations;

        for iteration in 1..=defaults.max_tool_iterations {
            reached_iteration = iteration;
            log::info!("Agent loop iteration {iteration}/{}", defaults.max_tool_iterations);

            let params = ChatParams {
                model: Some(effective_model.clone()),
                tools: tools.clone(),
                temperature: Some(defaults.temperature),
                max_tokens: Some(defaults.max_tokens),
            };
            let response = self.call_llm(&messages, &params).await?;
            total_prompt_tokens += response.usage.prompt_tokens;
            total_completion_tokens += response.usage.completion_tokens;

            if !response.has_tool_calls() {
                let final_text = response.content.unwrap_or_default();
                log::info!("Agent finished after {iteration} iterations ({} tool calls)", all_tool_calls.len());

                let result = AgentRunResult {
                    response: final_text.clone(),
                    iterations: iteration,
                    prompt_tokens: total_prompt_tokens,
                    completion_tokens: total_completion_tokens,
                    tool_calls_made: all_tool_calls.clone(),
                    tool_details: all_tool_details,
                };

                self.persist_session(session.clone(), user_message, &final_text);
                let mut session = self.sessions.get_or_create(session_key);
                self.maybe_consolidate(&mut session).await;

                if let Some(cache) = &self.semantic_cache {
                    if all_tool_calls.is_empty() {
                        let _ = cache.put(user_message, &effective_model, &final_text);
                    }
                }

                return Ok(result);
            }

            let signature = tool_call_signature(&response.tool_calls);
            if last_tool_signature == Some(signature) {
                repeated_signature_count += 1;
            } else {
                last_tool_signature = Some(signature);
                repeated_signature_count = 1;
            }
            if repeated_signature_count >= MAX_REPEATED_TOOL_CALLS {
                log::warn!(
                    "Agent dispatched the same tool call {repeated_signature_count} times consecutively, short-circuiting to exhaustion handling"
                );
                break;
            }

            messages.push(Message::assistant_tool_calls(response.content.clone(), response.tool_calls.clone()));

            let exec_results = futures::future::join_all(
                response.tool_calls.iter().map(|tc| self.execute_tool_call(tc, &tool_ctx)),
            )
            .await;

            let mut failed_tools: Vec<String> = Vec::new();
            for exec_result in exec_results {
                all_tool_calls.push(exec_result.tool_name.clone());
                all_tool_details.push(ToolCallDetail::new(
                    &exec_result.tool_name,
                    exec_result.success,
                    exec_result.duration_ms,
                    &exec_result.output,
                ));
                messages.push(Message::tool_result(&exec_result.tool_call_id, &exec_result.tool_name, &exec_result.output));
                if !exec_result.success {
                    failed_tools.push(format!("{}: {}", exec_result.tool_name, truncate(&exec_result.output, 200)));
                }
            }

            if !failed_tools.is_empty() && defaults.enable_self_correction {
                let failure_summary = failed_tools.join("; ");
                messages.push(Message::system(format!(
                    "[Self-correction] The following tool calls failed: {failure_summary}. \
                     Before proceeding, analyze what went wrong and adjust your approach. \
                     Consider: wrong arguments, missing prerequisites, or alternative tools."
                )));
            }
        }

        log::warn!("Agent exhausted after {reached_iteration} iteration(s) (limit {}), generating forced response", defaults.max_tool_iterations);
        messages.push(Message::user(
            "I've reached my maximum number of tool iterations for this request. \
             Here's what I've done so far based on the tool results above.",
        ));
        let params = ChatParams {
            model: Some(effective_model.clone()),
            tools: None,
            temperature: Some(defaults.temperature),
            max_tokens: Some(defaults.max_tokens),
        };
        let response = self.call_llm(&messages, &params).await?;
        total_prompt_tokens += response.usage.prompt_tokens;
        total_completion_tokens += response.usage.completion_tokens;
        let final_text = response.content.unwrap_or_else(|| "I was unable to complete the request within the iteration limit.".to_string());

        let result = AgentRunResult {
            response: final_text.clone(),
            iterations: reached_iteration,
            prompt_tokens: total_prompt_tokens,
            completion_tokens: total_completion_tokens,
            tool_calls_made: all_tool_calls,
            tool_details: all_tool_details,
        };
        self.persist_session(session.clone(), user_message, &final_text);
        let mut session = self.sessions.get_or_create(session_key);
        self.maybe_consolidate(&mut session).await;
        Ok(result)
    }

    async fn consolidate_session(&self, session_key: &str) -> GripResult<()> {
        let lock = self.sessions.lock_for(session_key);
        let _guard = lock.lock().await;
        let mut session = self.sessions.get_or_create(session_key);
        self.run_consolidation(&mut session).await;
        Ok(())
    }

    async fn reset_session(&self, session_key: &str) -> GripResult<()> {
        let lock = self.sessions.lock_for(session_key);
        let _guard = lock.lock().await;
        self.sessions.delete(session_key);
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GripConfig;
    use crate::memory::MemoryManager;
    use crate::session::SessionManager;
    use crate::tools::ToolRegistry;
    use crate::types::LLMResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        responses: Vec<LLMResponse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for StaticProvider {
        async fn chat(&self, _messages: &[Message], _params: &ChatParams) -> GripResult<LLMResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.get(i).cloned().unwrap_or_else(|| self.responses.last().unwrap().clone()))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn harness(responses: Vec<LLMResponse>) -> (tempfile::TempDir, AgentLoop) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        config.agents.defaults.max_tool_iterations = 5;
        let config = Arc::new(config);

        let provider = Arc::new(StaticProvider { responses, calls: AtomicUsize::new(0) });
        let registry = Arc::new(ToolRegistry::new());
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());

        (dir, AgentLoop::new(config, provider, registry, sessions, memory))
    }

    #[tokio::test]
    async fn plain_text_response_finishes_in_one_iteration() {
        let (_dir, engine) = harness(vec![LLMResponse { content: Some("hi there".into()), ..Default::default() }]);
        let result = engine.run("hello", "cli:test", None).await.unwrap();
        assert_eq!(result.response, "hi there");
        assert_eq!(result.iterations, 1);
        assert!(result.tool_calls_made.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_call_is_reported_as_failed_and_loop_continues() {
        let tool_call = ToolCall { id: "1".into(), function_name: "does_not_exist".into(), arguments: serde_json::json!({}) };
        let (_dir, engine) = harness(vec![
            LLMResponse { content: None, tool_calls: vec![tool_call], ..Default::default() },
            LLMResponse { content: Some("done".into()), ..Default::default() },
        ]);
        let result = engine.run("do something", "cli:test2", None).await.unwrap();
        assert_eq!(result.response, "done");
        assert_eq!(result.tool_calls_made, vec!["does_not_exist"]);
        assert!(!result.tool_details[0].success);
    }

    #[tokio::test]
    async fn repeated_identical_tool_call_short_circuits_before_max_iterations() {
        let tool_call = ToolCall { id: "1".into(), function_name: "search_memory".into(), arguments: serde_json::json!({"query": "x"}) };
        let (_dir, engine) = harness(vec![LLMResponse { content: None, tool_calls: vec![tool_call], ..Default::default() }]);
        let result = engine.run("keep looking", "cli:repeat", None).await.unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.tool_calls_made.len(), 2);
        assert_eq!(result.response, "I was unable to complete the request within the iteration limit.");
    }

    #[tokio::test]
    async fn reset_session_deletes_persisted_state() {
        let (_dir, engine) = harness(vec![LLMResponse { content: Some("ok".into()), ..Default::default() }]);
        engine.run("hi", "cli:reset", None).await.unwrap();
        assert!(engine.sessions.get("cli:reset").is_some());
        engine.reset_session("cli:reset").await.unwrap();
        assert!(engine.sessions.get("cli:reset").is_none());
    }
}
