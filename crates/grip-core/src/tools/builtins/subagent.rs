//! `spawn_subagent` / `list_subagents` / `cancel_subagent`: the LLM's
//! own interface onto the [`SubagentManager`].

use crate::subagent::SubagentManager;
use crate::tools::base::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn create_subagent_tools(subagents: Arc<SubagentManager>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(SpawnSubagentTool { subagents: subagents.clone() }),
        Arc::new(ListSubagentsTool { subagents: subagents.clone() }),
        Arc::new(CancelSubagentTool { subagents }),
    ]
}

pub struct SpawnSubagentTool {
    subagents: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for SpawnSubagentTool {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Spawn a background subagent to work on an independent task. Returns immediately with an id; poll with list_subagents."
    }

    fn category(&self) -> &str {
        "subagent"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "Description of the task for the subagent to perform"}
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, params: &Value, _ctx: &ToolContext) -> String {
        let Some(task) = params["task"].as_str() else {
            return "Error: missing 'task' argument".to_string();
        };
        match self.subagents.spawn_task(task) {
            Ok(id) => format!("Spawned subagent {id} for task: {task}"),
            Err(e) => format!("Error: {e}"),
        }
    }
}

pub struct ListSubagentsTool {
    subagents: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for ListSubagentsTool {
    fn name(&self) -> &str {
        "list_subagents"
    }

    fn description(&self) -> &str {
        "List all subagents spawned in this session and their status."
    }

    fn category(&self) -> &str {
        "subagent"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: &Value, _ctx: &ToolContext) -> String {
        let agents = self.subagents.list_all();
        if agents.is_empty() {
            return "No subagents have been spawned.".to_string();
        }
        match serde_json::to_string_pretty(&agents) {
            Ok(json) => json,
            Err(e) => format!("Error serializing subagent list: {e}"),
        }
    }
}

pub struct CancelSubagentTool {
    subagents: Arc<SubagentManager>,
}

#[async_trait]
impl Tool for CancelSubagentTool {
    fn name(&self) -> &str {
        "cancel_subagent"
    }

    fn description(&self) -> &str {
        "Cancel a running subagent by id."
    }

    fn category(&self) -> &str {
        "subagent"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Subagent id returned by spawn_subagent"}
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: &Value, _ctx: &ToolContext) -> String {
        let Some(id) = params["id"].as_str() else {
            return "Error: missing 'id' argument".to_string();
        };
        if self.subagents.cancel(id) {
            format!("Cancelled subagent {id}")
        } else {
            format!("Error: subagent '{id}' not found or already finished")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subagent::SubagentRunner;

    struct EchoRunner;
    #[async_trait]
    impl SubagentRunner for EchoRunner {
        async fn run(&self, task: &str) -> Result<String, String> {
            Ok(format!("did: {task}"))
        }
    }

    #[tokio::test]
    async fn spawn_without_runner_reports_error() {
        let subagents = Arc::new(SubagentManager::new());
        let tool = SpawnSubagentTool { subagents };
        let ctx = ToolContext::new(std::env::temp_dir());
        let out = tool.execute(&json!({"task": "thing"}), &ctx).await;
        assert!(out.starts_with("Error"));
    }

    #[tokio::test]
    async fn spawn_and_list_round_trip() {
        let subagents = Arc::new(SubagentManager::new());
        subagents.set_runner(Arc::new(EchoRunner));
        let spawn = SpawnSubagentTool { subagents: subagents.clone() };
        let ctx = ToolContext::new(std::env::temp_dir());
        let out = spawn.execute(&json!({"task": "research"}), &ctx).await;
        assert!(out.starts_with("Spawned subagent"));

        let list = ListSubagentsTool { subagents };
        let listed = list.execute(&json!({}), &ctx).await;
        assert!(listed.contains("research"));
    }
}
