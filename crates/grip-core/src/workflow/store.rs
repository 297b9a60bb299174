//! Workflow definition persistence: one JSON file per workflow under
//! `<workspace>/workflows/`.

use super::models::WorkflowDef;
use crate::error::GripResult;
use std::path::{Path, PathBuf};

pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(workflows_dir: impl AsRef<Path>) -> GripResult<Self> {
        let dir = workflows_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Atomically write a workflow definition to disk, returning its path.
    pub fn save(&self, workflow: &WorkflowDef) -> GripResult<PathBuf> {
        let path = self.path_for(&workflow.name);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(workflow)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        log::debug!("Saved workflow: {}", workflow.name);
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Option<WorkflowDef> {
        let path = self.path_for(name);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(def) => Some(def),
            Err(e) => {
                log::error!("Failed to load workflow '{name}': {e}");
                None
            }
        }
    }

    pub fn list_workflows(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return Vec::new() };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|s| s.to_str()) == Some("json") {
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    pub fn delete(&self, name: &str) -> bool {
        let path = self.path_for(name);
        if path.exists() {
            let _ = std::fs::remove_file(&path);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::models::StepDef;

    fn sample() -> WorkflowDef {
        WorkflowDef {
            name: "deploy".to_string(),
            description: "ship it".to_string(),
            steps: vec![StepDef { name: "build".to_string(), prompt: "build it".to_string(), ..Default::default() }],
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path()).unwrap();
        store.save(&sample()).unwrap();

        let loaded = store.load("deploy").unwrap();
        assert_eq!(loaded.name, "deploy");
        assert_eq!(loaded.steps.len(), 1);
    }

    #[test]
    fn list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path()).unwrap();
        store.save(&sample()).unwrap();

        assert_eq!(store.list_workflows(), vec!["deploy".to_string()]);
        assert!(store.delete("deploy"));
        assert!(store.list_workflows().is_empty());
        assert!(!store.delete("deploy"));
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path()).unwrap();
        assert!(store.load("nope").is_none());
    }
}
