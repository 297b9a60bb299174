//! `search_memory` / `memory_store`: the on-demand path onto the
//! Memory Manager, distinct from the automatic context-assembly
//! injection the agent loop performs on every turn.

use crate::memory::MemoryManager;
use crate::tools::base::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SearchMemoryTool {
    pub memory: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search long-term memory (facts and conversation history) for lines relevant to a query."
    }

    fn category(&self) -> &str {
        "memory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to search for"},
                "limit": {"type": "integer", "description": "Maximum results per source (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: &Value, _ctx: &ToolContext) -> String {
        let Some(query) = params["query"].as_str() else {
            return "Error: missing 'query' argument".to_string();
        };
        let limit = params["limit"].as_u64().unwrap_or(5) as usize;

        let facts = self.memory.search_memory(query, limit, "");
        let history = self.memory.search_history(query, limit, 0.05);

        if facts.is_empty() && history.is_empty() {
            return format!("No memory entries found for '{query}'.");
        }

        let mut out = String::new();
        if !facts.is_empty() {
            out.push_str("From MEMORY.md:\n");
            out.push_str(&facts.join("\n"));
        }
        if !history.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("From HISTORY.md:\n");
            out.push_str(&history.join("\n"));
        }
        out
    }
}

pub struct MemoryStoreTool {
    pub memory: Arc<MemoryManager>,
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> &str {
        "memory_store"
    }

    fn description(&self) -> &str {
        "Record a durable fact to long-term memory, tagged with a category."
    }

    fn category(&self) -> &str {
        "memory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The fact to remember"},
                "category": {"type": "string", "description": "Short category tag, e.g. 'preference'"}
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, params: &Value, _ctx: &ToolContext) -> String {
        let Some(content) = params["content"].as_str() else {
            return "Error: missing 'content' argument".to_string();
        };
        let category = params["category"].as_str().unwrap_or("fact");
        let entry = format!("- [{category}] {content}");

        match self.memory.append_to_memory(&entry) {
            Ok(()) => format!("Remembered: {content}"),
            Err(e) => format!("Error storing memory: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_search_finds_entry() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryManager::new(dir.path()).unwrap());
        let ctx = ToolContext::new(dir.path());

        let store = MemoryStoreTool { memory: memory.clone() };
        let out = store.execute(&json!({"content": "User prefers dark mode", "category": "preference"}), &ctx).await;
        assert!(out.starts_with("Remembered"));

        let search = SearchMemoryTool { memory };
        let found = search.execute(&json!({"query": "dark mode"}), &ctx).await;
        assert!(found.contains("dark mode"));
    }
}
