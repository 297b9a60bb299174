//! Background subagents: independent tokio tasks with their own
//! message history, spawned by the `spawn_subagent` tool and tracked
//! by ID so the parent agent can poll or cancel them.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Runs a subagent's independent agent loop given its task description.
/// Implemented by the engine layer and wired into the manager so the
/// `spawn_subagent` tool can start real work without the tool layer
/// depending on the engine.
#[async_trait]
pub trait SubagentRunner: Send + Sync {
    async fn run(&self, task_description: &str) -> Result<String, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct Inner {
    task_description: String,
    status: SubagentStatus,
    result: Option<String>,
}

/// Snapshot of a subagent's tracking record, safe to hand to a tool
/// caller (no join handle, which isn't `Clone`).
#[derive(Debug, Clone, Serialize)]
pub struct SubagentInfo {
    pub id: String,
    pub task_description: String,
    pub status: SubagentStatus,
    pub result: Option<String>,
}

struct Entry {
    inner: Arc<Mutex<Inner>>,
    handle: JoinHandle<()>,
}

/// Manages the lifecycle of background subagents spawned as tokio tasks.
#[derive(Default)]
pub struct SubagentManager {
    agents: Mutex<HashMap<String, Entry>>,
    runner: Mutex<Option<Arc<dyn SubagentRunner>>>,
}

impl SubagentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the engine-backed runner used by [`Self::spawn_task`].
    pub fn set_runner(&self, runner: Arc<dyn SubagentRunner>) {
        *self.runner.lock() = Some(runner);
    }

    /// Spawn a subagent that runs the installed [`SubagentRunner`]. Returns
    /// an error string (not an id) when no runner has been installed, so
    /// the `spawn_subagent` tool can surface a clear message to the LLM.
    pub fn spawn_task(self: &Arc<Self>, task_description: impl Into<String>) -> Result<String, String> {
        let task_description = task_description.into();
        let Some(runner) = self.runner.lock().clone() else {
            return Err("subagent runner is not configured".to_string());
        };
        let task_for_run = task_description.clone();
        Ok(self.spawn(task_description, async move { runner.run(&task_for_run).await }))
    }

    /// Spawn `run` as an independent task tracked under a fresh
    /// `sub_<8 hex>` id, and return that id immediately.
    pub fn spawn<F>(&self, task_description: impl Into<String>, run: F) -> String
    where
        F: Future<Output = Result<String, String>> + Send + 'static,
    {
        let agent_id = format!("sub_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let task_description = task_description.into();
        let inner = Arc::new(Mutex::new(Inner {
            task_description: task_description.clone(),
            status: SubagentStatus::Running,
            result: None,
        }));

        let inner_task = inner.clone();
        let id_for_log = agent_id.clone();
        let handle = tokio::spawn(async move {
            match run.await {
                Ok(result) => {
                    let mut inner = inner_task.lock();
                    inner.result = Some(result);
                    inner.status = SubagentStatus::Completed;
                    log::info!("Subagent {id_for_log} completed");
                }
                Err(err) => {
                    let mut inner = inner_task.lock();
                    inner.result = Some(format!("Error: {err}"));
                    inner.status = SubagentStatus::Failed;
                    log::error!("Subagent {id_for_log} failed: {err}");
                }
            }
        });

        self.agents.lock().insert(agent_id.clone(), Entry { inner, handle });
        log::info!("Spawned subagent {agent_id}: {}", &task_description[..task_description.len().min(100)]);
        agent_id
    }

    pub fn get(&self, agent_id: &str) -> Option<SubagentInfo> {
        let agents = self.agents.lock();
        let entry = agents.get(agent_id)?;
        let inner = entry.inner.lock();
        Some(SubagentInfo {
            id: agent_id.to_string(),
            task_description: inner.task_description.clone(),
            status: inner.status,
            result: inner.result.clone(),
        })
    }

    pub fn list_active(&self) -> Vec<SubagentInfo> {
        self.list_all().into_iter().filter(|a| a.status == SubagentStatus::Running).collect()
    }

    pub fn list_all(&self) -> Vec<SubagentInfo> {
        let agents = self.agents.lock();
        agents
            .iter()
            .map(|(id, entry)| {
                let inner = entry.inner.lock();
                SubagentInfo {
                    id: id.clone(),
                    task_description: inner.task_description.clone(),
                    status: inner.status,
                    result: inner.result.clone(),
                }
            })
            .collect()
    }

    pub fn cancel(&self, agent_id: &str) -> bool {
        let agents = self.agents.lock();
        let Some(entry) = agents.get(agent_id) else { return false };
        if entry.handle.is_finished() {
            return false;
        }
        entry.handle.abort();
        entry.inner.lock().status = SubagentStatus::Cancelled;
        true
    }

    pub fn cancel_all(&self) -> usize {
        let agents = self.agents.lock();
        let mut count = 0;
        for entry in agents.values() {
            if !entry.handle.is_finished() {
                entry.handle.abort();
                entry.inner.lock().status = SubagentStatus::Cancelled;
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spawn_tracks_completion() {
        let manager = SubagentManager::new();
        let id = manager.spawn("do a thing", async { Ok("done".to_string()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let info = manager.get(&id).unwrap();
        assert_eq!(info.status, SubagentStatus::Completed);
        assert_eq!(info.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn spawn_tracks_failure() {
        let manager = SubagentManager::new();
        let id = manager.spawn("do a thing", async { Err("boom".to_string()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let info = manager.get(&id).unwrap();
        assert_eq!(info.status, SubagentStatus::Failed);
        assert_eq!(info.result.as_deref(), Some("Error: boom"));
    }

    #[tokio::test]
    async fn cancel_stops_pending_task() {
        let manager = SubagentManager::new();
        let id = manager.spawn("long task", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        });
        assert!(manager.cancel(&id));
        let info = manager.get(&id).unwrap();
        assert_eq!(info.status, SubagentStatus::Cancelled);
        assert!(!manager.cancel(&id));
    }

    #[tokio::test]
    async fn list_active_excludes_completed() {
        let manager = SubagentManager::new();
        manager.spawn("finishes", async { Ok("ok".to_string()) });
        let running_id = manager.spawn("keeps running", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let active = manager.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running_id);
    }
}
