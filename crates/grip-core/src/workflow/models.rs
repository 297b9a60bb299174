//! Workflow data models: a workflow is a DAG of steps where each step
//! runs an agent under a given profile. Steps may reference prior
//! outputs via `{{step_name.output}}`; independent steps (no edge
//! between them) execute concurrently.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Definition of a single workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDef {
    pub name: String,
    pub prompt: String,
    pub profile: String,
    pub depends_on: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for StepDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            prompt: String::new(),
            profile: "default".to_string(),
            depends_on: Vec::new(),
            timeout_seconds: 300,
        }
    }
}

/// Execution result of a single workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub output: String,
    pub error: String,
    pub iterations: u32,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_seconds: f64,
}

impl StepResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            output: String::new(),
            error: String::new(),
            iterations: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: 0.0,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now().to_rfc3339());
    }

    pub fn mark_completed(&mut self, output: String, iterations: u32) {
        self.status = StepStatus::Completed;
        self.output = output;
        self.iterations = iterations;
        self.finish();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.error = error;
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now.to_rfc3339());
        if let Some(started) = &self.started_at {
            if let Ok(start) = chrono::DateTime::parse_from_rfc3339(started) {
                self.duration_seconds = (now - start.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0;
            }
        }
    }
}

/// Complete workflow definition: a named DAG of steps.
///
/// Steps are validated before execution to ensure no duplicate names,
/// all `depends_on` references resolve, and no circular dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowDef {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDef>,
}

impl Default for WorkflowDef {
    fn default() -> Self {
        Self { name: String::new(), description: String::new(), steps: Vec::new() }
    }
}

impl WorkflowDef {
    /// Return validation errors; an empty vec means the workflow is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let names: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();

        if names.len() != self.steps.len() {
            errors.push("Duplicate step names found".to_string());
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !names.contains(dep.as_str()) {
                    errors.push(format!("Step '{}' depends on unknown step '{dep}'", step.name));
                }
            }
        }

        if errors.is_empty() && self.has_cycle() {
            errors.push("Circular dependency detected in workflow steps".to_string());
        }

        errors
    }

    fn adjacency(&self) -> (HashMap<String, Vec<String>>, HashMap<String, usize>) {
        let mut adj: HashMap<String, Vec<String>> =
            self.steps.iter().map(|s| (s.name.clone(), Vec::new())).collect();
        let mut in_degree: HashMap<String, usize> =
            self.steps.iter().map(|s| (s.name.clone(), 0)).collect();
        for step in &self.steps {
            for dep in &step.depends_on {
                adj.entry(dep.clone()).or_default().push(step.name.clone());
                *in_degree.entry(step.name.clone()).or_default() += 1;
            }
        }
        (adj, in_degree)
    }

    fn has_cycle(&self) -> bool {
        let (adj, mut in_degree) = self.adjacency();
        let mut queue: VecDeque<String> =
            in_degree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| n.clone()).collect();
        let mut visited = 0;
        while let Some(node) = queue.pop_front() {
            visited += 1;
            for neighbor in &adj[&node] {
                let d = in_degree.get_mut(neighbor).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(neighbor.clone());
                }
            }
        }
        visited != self.steps.len()
    }

    /// Group steps into parallel execution layers: every step in a
    /// layer has all its dependencies satisfied by earlier layers.
    pub fn execution_order(&self) -> Vec<Vec<String>> {
        let (adj, mut in_degree) = self.adjacency();
        let mut layers = Vec::new();
        let mut queue: Vec<String> =
            in_degree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| n.clone()).collect();

        while !queue.is_empty() {
            queue.sort();
            layers.push(queue.clone());
            let mut next_queue = Vec::new();
            for node in &queue {
                for neighbor in &adj[node] {
                    let d = in_degree.get_mut(neighbor).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        next_queue.push(neighbor.clone());
                    }
                }
            }
            queue = next_queue;
        }
        layers
    }
}

/// Complete result of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub workflow_name: String,
    pub status: String,
    pub step_results: HashMap<String, StepResult>,
    pub started_at: String,
    pub completed_at: String,
    pub total_duration_seconds: f64,
}

impl WorkflowRunResult {
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            status: "running".to_string(),
            step_results: HashMap::new(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: String::new(),
            total_duration_seconds: 0.0,
        }
    }

    pub fn all_completed(&self) -> bool {
        self.step_results.values().all(|r| r.status == StepStatus::Completed)
    }

    pub fn has_failures(&self) -> bool {
        self.step_results.values().any(|r| r.status == StepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, deps: &[&str]) -> StepDef {
        StepDef {
            name: name.to_string(),
            prompt: format!("do {name}"),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_catches_unknown_dependency() {
        let wf = WorkflowDef {
            name: "wf".to_string(),
            steps: vec![step("a", &["missing"])],
            ..Default::default()
        };
        let errors = wf.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown step 'missing'"));
    }

    #[test]
    fn validate_catches_duplicate_names() {
        let wf = WorkflowDef {
            name: "wf".to_string(),
            steps: vec![step("a", &[]), step("a", &[])],
            ..Default::default()
        };
        assert!(wf.validate().iter().any(|e| e.contains("Duplicate")));
    }

    #[test]
    fn validate_catches_cycle() {
        let wf = WorkflowDef {
            name: "wf".to_string(),
            steps: vec![step("a", &["b"]), step("b", &["a"])],
            ..Default::default()
        };
        assert!(wf.validate().iter().any(|e| e.contains("Circular")));
    }

    #[test]
    fn execution_order_groups_independent_steps() {
        let wf = WorkflowDef {
            name: "wf".to_string(),
            steps: vec![step("a", &[]), step("b", &[]), step("c", &["a", "b"])],
            ..Default::default()
        };
        assert!(wf.validate().is_empty());
        let layers = wf.execution_order();
        assert_eq!(layers, vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn step_result_completed_sets_duration() {
        let mut result = StepResult::new("a");
        result.mark_running();
        std::thread::sleep(std::time::Duration::from_millis(5));
        result.mark_completed("done".to_string(), 2);
        assert_eq!(result.status, StepStatus::Completed);
        assert!(result.duration_seconds >= 0.0);
    }
}
