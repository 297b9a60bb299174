//! Tool abstraction: the `Tool` trait every built-in and MCP tool
//! implements, the per-call `ToolContext`, and the `ToolRegistry` that
//! owns registration, schema export, and dispatch.

use crate::types::ExtraContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Runtime context passed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_path: PathBuf,
    pub restrict_to_workspace: bool,
    pub shell_timeout: u64,
    pub session_key: String,
    pub extra: ExtraContext,
}

impl ToolContext {
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            restrict_to_workspace: false,
            shell_timeout: 60,
            session_key: String::new(),
            extra: ExtraContext::new(),
        }
    }

    pub fn dry_run(&self) -> bool {
        self.extra.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique identifier used as the tool-call function name.
    fn name(&self) -> &str;

    /// One-line description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) describing accepted parameters.
    fn parameters(&self) -> serde_json::Value;

    /// Grouping for system-prompt display. Defaults to `"general"`.
    fn category(&self) -> &str {
        "general"
    }

    /// Run the tool with validated parameters and return a result.
    ///
    /// Implementations should catch their own errors and return an
    /// `Error: ...`-prefixed string rather than returning `Err`, so
    /// the LLM sees what went wrong and can adapt.
    async fn execute(&self, params: &serde_json::Value, ctx: &ToolContext) -> String;

    /// Serialize this tool to the OpenAI function-calling schema format.
    fn to_definition(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            },
        })
    }
}

/// Central registry of tool instances. Reads are lock-free through an
/// `Arc`-cloned snapshot; registration is expected to happen once at
/// startup, so it pays the `Mutex` cost.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Mutex<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.lock();
        if tools.contains_key(tool.name()) {
            log::warn!("Overwriting existing tool registration: {}", tool.name());
        }
        log::debug!("Registered tool: {}", tool.name());
        tools.insert(tool.name().to_string(), tool);
    }

    pub fn register_many(&self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.tools.lock().remove(name).is_some();
        if removed {
            log::debug!("Unregistered tool: {name}");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.lock().keys().cloned().collect()
    }

    pub fn get_definitions(&self) -> Vec<serde_json::Value> {
        self.tools.lock().values().map(|t| t.to_definition()).collect()
    }

    /// Tools grouped by category, for system-prompt generation.
    pub fn tools_by_category(&self) -> HashMap<String, Vec<Arc<dyn Tool>>> {
        let mut groups: HashMap<String, Vec<Arc<dyn Tool>>> = HashMap::new();
        for tool in self.tools.lock().values() {
            groups.entry(tool.category().to_string()).or_default().push(tool.clone());
        }
        groups
    }

    /// Look up a tool by name and run it. Returns an error string
    /// (never panics/propagates) when the tool is unknown.
    pub async fn execute(&self, name: &str, params: &serde_json::Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.get(name) else {
            let available = self.names().join(", ");
            return format!("Error: Unknown tool '{name}'. Available: {available}");
        };
        tool.execute(params, ctx).await
    }

    pub fn len(&self) -> usize {
        self.tools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.lock().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its input."
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, params: &serde_json::Value, _ctx: &ToolContext) -> String {
            params.to_string()
        }
    }

    #[tokio::test]
    async fn registers_and_executes() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let ctx = ToolContext::new(std::env::temp_dir());
        let result = registry.execute("echo", &serde_json::json!({"a": 1}), &ctx).await;
        assert_eq!(result, "{\"a\":1}");
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_string() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::new(std::env::temp_dir());
        let result = registry.execute("nope", &serde_json::json!({}), &ctx).await;
        assert!(result.starts_with("Error: Unknown tool 'nope'"));
    }

    #[test]
    fn unregister_and_definitions() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_definitions().len(), 1);
        assert!(registry.unregister("echo"));
        assert!(registry.is_empty());
    }
}
