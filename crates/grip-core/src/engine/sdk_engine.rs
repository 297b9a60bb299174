//! The delegated-SDK engine: hands the iteration loop to an external
//! agent SDK process and folds its streamed messages back into an
//! [`AgentRunResult`]. Grip keeps system-prompt assembly, MCP config
//! translation, the small fixed custom-tool set (`send_message`,
//! `send_file`, `remember`, `recall`), and the pre-tool-use/stop hooks
//! that enforce the shell denylist and directory trust.

use crate::config::GripConfig;
use crate::error::{GripError, GripResult};
use crate::memory::MemoryManager;
use crate::security::TrustManager;
use crate::session::SessionManager;
use crate::tools::builtins::shell::dangerous_match;
use crate::types::AgentRunResult;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;

use super::Engine;

/// Routes `send_message`/`send_file` custom-tool calls to the channel
/// that originated the turn. The gateway/CLI front end implements this
/// and wires it in before calling [`SdkEngine::run`].
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_text(&self, text: &str, session_key: &str) -> String;
    async fn send_file(&self, file_path: &str, caption: &str, session_key: &str) -> String;
}

/// One line of the child process's stream-json output.
enum SdkMessage {
    /// Assistant text or a tool-call name, surfaced incrementally.
    Assistant { text: Option<String>, tool_name: Option<String> },
    /// A control request the host must answer before the SDK proceeds:
    /// either a permission check for a built-in tool, or an invocation
    /// of one of grip's own custom tools.
    Control { id: String, tool_name: String, tool_input: Value },
    /// Terminal message: the run is complete.
    Result { text: Option<String> },
}

fn parse_sdk_message(line: &str) -> Option<SdkMessage> {
    let v: Value = serde_json::from_str(line).ok()?;
    match v.get("type").and_then(Value::as_str)? {
        "assistant" => {
            let text = v.get("text").and_then(Value::as_str).map(str::to_string);
            let tool_name = v.get("tool_name").and_then(Value::as_str).map(str::to_string);
            Some(SdkMessage::Assistant { text, tool_name })
        }
        "control_request" => {
            let id = v.get("id").and_then(Value::as_str)?.to_string();
            let tool_name = v.get("tool_name").and_then(Value::as_str)?.to_string();
            let tool_input = v.get("tool_input").cloned().unwrap_or(json!({}));
            Some(SdkMessage::Control { id, tool_name, tool_input })
        }
        "result" => {
            let text = v.get("text").and_then(Value::as_str).map(str::to_string);
            Some(SdkMessage::Result { text })
        }
        _ => None,
    }
}

/// `EngineProtocol`-equivalent wrapper around `claude_agent_sdk.query()`:
/// delegates the agentic loop entirely to an external process, spawned
/// fresh per turn and torn down when the stream ends.
pub struct SdkEngine {
    config: Arc<GripConfig>,
    sessions: Arc<SessionManager>,
    memory: Arc<MemoryManager>,
    trust: Option<Arc<TrustManager>>,
    workspace: PathBuf,
    sdk_command: String,
    sender: AsyncMutex<Option<Arc<dyn ChannelSender>>>,
}

impl SdkEngine {
    pub fn new(
        config: Arc<GripConfig>,
        sessions: Arc<SessionManager>,
        memory: Arc<MemoryManager>,
        trust: Option<Arc<TrustManager>>,
    ) -> Self {
        let workspace = config.agents.defaults.workspace.clone();
        Self {
            config,
            sessions,
            memory,
            trust,
            workspace,
            sdk_command: "claude".to_string(),
            sender: AsyncMutex::new(None),
        }
    }

    /// Override the external binary invoked for each turn. Defaults to
    /// `claude`, the reference agent SDK's CLI entry point.
    pub fn with_sdk_command(mut self, command: impl Into<String>) -> Self {
        self.sdk_command = command.into();
        self
    }

    pub async fn set_sender(&self, sender: Arc<dyn ChannelSender>) {
        *self.sender.lock().await = Some(sender);
    }

    fn build_mcp_config(&self) -> Vec<Value> {
        self.config
            .tools
            .mcp_servers
            .iter()
            .filter(|(_, srv)| srv.enabled)
            .map(|(name, srv)| {
                if !srv.url.is_empty() {
                    json!({"name": name, "url": srv.url, "headers": srv.headers})
                } else {
                    json!({"name": name, "command": srv.command, "args": srv.args, "env": srv.env})
                }
            })
            .collect()
    }

    fn build_system_prompt(&self, user_message: &str, session_key: &str) -> String {
        let mut parts = Vec::new();

        for name in ["AGENT.md", "IDENTITY.md", "SOUL.md", "USER.md"] {
            if let Ok(content) = std::fs::read_to_string(self.workspace.join(name)) {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    parts.push(format!("## {name}\n\n{trimmed}"));
                }
            }
        }

        let memory_hits = self.memory.search_memory(user_message, 5, "");
        if !memory_hits.is_empty() {
            let block: String = memory_hits.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
            parts.push(format!("## Relevant Memory\n\n{block}"));
        }

        let history_hits = self.memory.search_history(user_message, 5, 0.05);
        if !history_hits.is_empty() {
            let block: String = history_hits.iter().map(|h| format!("- {h}")).collect::<Vec<_>>().join("\n");
            parts.push(format!("## Relevant History\n\n{block}"));
        }

        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        parts.push(format!(
            "## Runtime Metadata\n\n- **Date/Time**: {now}\n- **Session**: {session_key}\n- **Workspace**: {}",
            self.workspace.display()
        ));

        parts.join("\n\n---\n\n")
    }

    /// PreToolUse: block dangerous shell commands and enforce directory
    /// trust for the SDK's built-in file tools. `None` means allow.
    async fn pre_tool_use(&self, tool_name: &str, tool_input: &Value) -> Option<(bool, String)> {
        if tool_name == "Bash" {
            let command = tool_input.get("command").and_then(Value::as_str).unwrap_or("");
            if let Some(pattern) = dangerous_match(command) {
                log::warn!("SDK hook blocked dangerous command matching {pattern}: {command}");
                return Some((false, format!("Blocked: matches dangerous pattern '{pattern}'")));
            }
        }

        if let Some(trust) = &self.trust {
            if matches!(tool_name, "Read" | "Write" | "Edit") {
                if let Some(file_path) = tool_input.get("file_path").and_then(Value::as_str) {
                    let resolved = shellexpand(file_path);
                    let parent = resolved.parent().map(PathBuf::from).unwrap_or(resolved.clone());
                    if !trust.is_trusted(&parent, &self.workspace).await {
                        log::warn!("SDK hook blocked file access outside trusted dirs: {}", resolved.display());
                        return Some((
                            false,
                            format!("Directory not trusted: {}. Use /trust to allow access.", parent.display()),
                        ));
                    }
                }
            }
        }

        None
    }

    fn post_tool_use(&self, tool_name: &str, output_len: usize) {
        log::debug!("SDK tool executed: {tool_name} -> {output_len} chars output");
    }

    /// Stop hook: persist a truncated conversation summary to HISTORY.md.
    fn stop_hook(&self, summary: &str) {
        if !summary.is_empty() {
            let truncated: String = summary.chars().take(500).collect();
            let _ = self.memory.append_history(&format!("[Session summary] {truncated}"));
            log::debug!("Stop hook: saved conversation summary to history");
        }
    }

    /// Handle the four fixed custom tools grip exposes to the SDK.
    /// Permission-checked built-in tools never reach here; this is only
    /// hit for tool names grip itself registered with the SDK options.
    async fn run_custom_tool(&self, tool_name: &str, tool_input: &Value, session_key: &str) -> Option<String> {
        match tool_name {
            "send_message" => {
                let text = tool_input.get("text").and_then(Value::as_str).unwrap_or("");
                let sender = self.sender.lock().await.clone();
                Some(match sender {
                    Some(s) => s.send_text(text, session_key).await,
                    None => "Send callback not configured; message not delivered.".to_string(),
                })
            }
            "send_file" => {
                let file_path = tool_input.get("file_path").and_then(Value::as_str).unwrap_or("");
                let caption = tool_input.get("caption").and_then(Value::as_str).unwrap_or("");
                let sender = self.sender.lock().await.clone();
                Some(match sender {
                    Some(s) => s.send_file(file_path, caption, session_key).await,
                    None => "Send file callback not configured; file not delivered.".to_string(),
                })
            }
            "remember" => {
                let fact = tool_input.get("fact").and_then(Value::as_str).unwrap_or("");
                let category = tool_input.get("category").and_then(Value::as_str).unwrap_or("general");
                let entry = format!("- [{category}] {fact}");
                Some(match self.memory.append_to_memory(&entry) {
                    Ok(()) => format!("Stored fact under category '{category}'."),
                    Err(e) => format!("Error storing fact: {e}"),
                })
            }
            "recall" => {
                let query = tool_input.get("query").and_then(Value::as_str).unwrap_or("");
                let results = self.memory.search_memory(query, 10, "");
                Some(if results.is_empty() { "No matching facts found in memory.".to_string() } else { results.join("\n") })
            }
            _ => None,
        }
    }

    fn custom_tool_definitions() -> Vec<Value> {
        vec![
            json!({"name": "send_message", "description": "Send a text message to the user via the configured channel.",
                   "input_schema": {"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}}),
            json!({"name": "send_file", "description": "Send a file to the user via the configured channel.",
                   "input_schema": {"type": "object", "properties": {"file_path": {"type": "string"}, "caption": {"type": "string"}}, "required": ["file_path"]}}),
            json!({"name": "remember", "description": "Store a fact in long-term memory for future recall.",
                   "input_schema": {"type": "object", "properties": {"fact": {"type": "string"}, "category": {"type": "string"}}, "required": ["fact"]}}),
            json!({"name": "recall", "description": "Search long-term memory for facts matching the query.",
                   "input_schema": {"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}}),
        ]
    }
}

fn shellexpand(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[async_trait]
impl Engine for SdkEngine {
    async fn run(&self, user_message: &str, session_key: &str, model: Option<&str>) -> GripResult<AgentRunResult> {
        let defaults = &self.config.agents.defaults;
        let effective_model = model.map(str::to_string).unwrap_or_else(|| defaults.sdk_model.clone());

        let system_prompt = self.build_system_prompt(user_message, session_key);
        let mcp_config = self.build_mcp_config();
        let options = json!({
            "model": effective_model,
            "system_prompt": system_prompt,
            "tools": Self::custom_tool_definitions(),
            "mcp_servers": mcp_config,
            "permission_mode": defaults.sdk_permission_mode,
            "cwd": self.workspace.to_string_lossy(),
        });

        let mut env: HashMap<&str, &str> = HashMap::new();
        if let Some(provider) = self.config.providers.get("anthropic") {
            let key = provider.api_key.expose();
            if !key.is_empty() {
                env.insert("ANTHROPIC_API_KEY", key);
            }
        }

        let mut child = {
            let mut cmd = Command::new(&self.sdk_command);
            cmd.arg("--input-format")
                .arg("stream-json")
                .arg("--output-format")
                .arg("stream-json")
                .arg("--print")
                .current_dir(&self.workspace)
                .envs(&env)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            cmd.spawn().map_err(|e| GripError::Other(format!("failed to spawn SDK process '{}': {e}", self.sdk_command)))?
        };

        let mut stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();

        let turn = json!({"type": "turn_start", "prompt": user_message, "options": options});
        stdin
            .write_all(format!("{}\n", turn).as_bytes())
            .await
            .map_err(|e| GripError::Other(format!("failed to write to SDK process stdin: {e}")))?;

        let mut response_parts: Vec<String> = Vec::new();
        let mut tool_calls_made: Vec<String> = Vec::new();

        while let Ok(Some(line)) = lines.next_line().await {
            let Some(message) = parse_sdk_message(&line) else { continue };
            match message {
                SdkMessage::Assistant { text, tool_name } => {
                    if let Some(text) = text {
                        response_parts.push(text);
                    }
                    if let Some(name) = tool_name {
                        tool_calls_made.push(name);
                    }
                }
                SdkMessage::Control { id, tool_name, tool_input } => {
                    if let Some(output) = self.run_custom_tool(&tool_name, &tool_input, session_key).await {
                        self.post_tool_use(&tool_name, output.len());
                        let reply = json!({"type": "control_response", "id": id, "decision": "allow", "output": output});
                        let _ = stdin.write_all(format!("{}\n", reply).as_bytes()).await;
                        continue;
                    }
                    let (allow, message) = match self.pre_tool_use(&tool_name, &tool_input).await {
                        Some((allow, message)) => (allow, message),
                        None => (true, String::new()),
                    };
                    let reply = json!({
                        "type": "control_response",
                        "id": id,
                        "decision": if allow { "allow" } else { "block" },
                        "message": message,
                    });
                    let _ = stdin.write_all(format!("{}\n", reply).as_bytes()).await;
                }
                SdkMessage::Result { text } => {
                    if let Some(text) = text {
                        response_parts.push(text);
                    }
                    break;
                }
            }
        }

        let _ = child.wait().await;

        let response_text = response_parts.join("\n");

        let _ = self.memory.append_history(&format!("User ({session_key}): {}", truncate(user_message, 200)));
        let _ = self.memory.append_history(&format!("Agent ({session_key}): {}", truncate(&response_text, 200)));
        self.stop_hook(&response_text);

        Ok(AgentRunResult {
            response: response_text,
            iterations: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            tool_calls_made,
            tool_details: Vec::new(),
        })
    }

    /// No-op: the SDK owns its own context window. Logged so operators
    /// can see consolidation was requested against a session the SDK
    /// manages internally.
    async fn consolidate_session(&self, session_key: &str) -> GripResult<()> {
        log::info!("consolidate_session called for '{session_key}' (SDK handles context internally)");
        Ok(())
    }

    async fn reset_session(&self, session_key: &str) -> GripResult<()> {
        self.sessions.delete(session_key);
        log::info!("Reset session '{session_key}'");
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_message() {
        let msg = parse_sdk_message(r#"{"type":"assistant","text":"hello","tool_name":null}"#).unwrap();
        match msg {
            SdkMessage::Assistant { text, tool_name } => {
                assert_eq!(text.as_deref(), Some("hello"));
                assert!(tool_name.is_none());
            }
            _ => panic!("expected assistant message"),
        }
    }

    #[test]
    fn parses_control_request() {
        let msg = parse_sdk_message(r#"{"type":"control_request","id":"r1","tool_name":"Bash","tool_input":{"command":"ls"}}"#).unwrap();
        match msg {
            SdkMessage::Control { id, tool_name, tool_input } => {
                assert_eq!(id, "r1");
                assert_eq!(tool_name, "Bash");
                assert_eq!(tool_input["command"], "ls");
            }
            _ => panic!("expected control request"),
        }
    }

    #[test]
    fn unknown_message_type_is_ignored() {
        assert!(parse_sdk_message(r#"{"type":"heartbeat"}"#).is_none());
    }

    #[tokio::test]
    async fn pre_tool_use_blocks_dangerous_shell_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let engine = SdkEngine::new(config, sessions, memory, None);

        let decision = engine.pre_tool_use("Bash", &json!({"command": "rm -rf /"})).await;
        assert_eq!(decision.unwrap().0, false);
    }

    #[tokio::test]
    async fn pre_tool_use_allows_safe_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let engine = SdkEngine::new(config, sessions, memory, None);

        let decision = engine.pre_tool_use("Bash", &json!({"command": "echo hi"})).await;
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn remember_and_recall_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GripConfig::default();
        config.agents.defaults.workspace = dir.path().to_path_buf();
        let config = Arc::new(config);
        let sessions = Arc::new(SessionManager::new(dir.path().join("sessions")).unwrap());
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let engine = SdkEngine::new(config, sessions, memory, None);

        let stored = engine.run_custom_tool("remember", &json!({"fact": "likes rust", "category": "preferences"}), "cli:1").await;
        assert!(stored.unwrap().contains("preferences"));

        let recalled = engine.run_custom_tool("recall", &json!({"query": "rust"}), "cli:1").await.unwrap();
        assert!(recalled.contains("likes rust"));
    }
}
