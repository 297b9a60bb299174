//! Executes a [`WorkflowDef`] end to end: validates the DAG, runs each
//! layer's steps concurrently through the shared [`Engine`], resolves
//! `{{step_name.output}}` templates, and skips dependents of a failed
//! step.

use super::models::{StepDef, StepResult, StepStatus, WorkflowDef, WorkflowRunResult};
use crate::config::schema::{AgentProfile, GripConfig};
use crate::engine::Engine;
use crate::error::{GripError, GripResult};
use chrono::Utc;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::OnceLock;

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{(\w+)\.output\}\}").unwrap())
}

/// Runs multi-step agent workflows. Each step executes through the
/// same [`Engine`] the rest of the platform uses, under the agent
/// profile the step names.
pub struct WorkflowEngine {
    config: Arc<GripConfig>,
    engine: Arc<dyn Engine>,
}

impl WorkflowEngine {
    pub fn new(config: Arc<GripConfig>, engine: Arc<dyn Engine>) -> Self {
        Self { config, engine }
    }

    /// Execute `workflow` and return the aggregated result. Fails fast
    /// (without running anything) if the DAG does not validate.
    pub async fn run(&self, workflow: &WorkflowDef) -> GripResult<WorkflowRunResult> {
        let errors = workflow.validate();
        if !errors.is_empty() {
            return Err(GripError::WorkflowValidation(errors.join("; ")));
        }

        let layers = workflow.execution_order();
        let mut result = WorkflowRunResult::new(workflow.name.clone());

        let step_map: HashMap<String, StepDef> =
            workflow.steps.iter().map(|s| (s.name.clone(), s.clone())).collect();
        for step in &workflow.steps {
            result.step_results.insert(step.name.clone(), StepResult::new(step.name.clone()));
        }

        log::info!(
            "Workflow '{}' starting: {} steps in {} layers",
            workflow.name,
            workflow.steps.len(),
            layers.len()
        );

        for (layer_idx, layer_names) in layers.iter().enumerate() {
            log::info!("Executing layer {}/{}: {layer_names:?}", layer_idx + 1, layers.len());

            let resolved_prompts: HashMap<String, String> = layer_names
                .iter()
                .map(|name| {
                    let prompt = &step_map[name].prompt;
                    (name.clone(), self.resolve_template(prompt, &result.step_results))
                })
                .collect();

            let futures = layer_names.iter().map(|name| {
                let step_def = step_map[name].clone();
                let prompt = resolved_prompts[name].clone();
                self.execute_step(step_def, prompt)
            });
            let step_outcomes = futures::future::join_all(futures).await;

            for (name, outcome) in layer_names.iter().zip(step_outcomes) {
                result.step_results.insert(name.clone(), outcome);
            }

            if layer_names.iter().any(|n| result.step_results[n].status == StepStatus::Failed) {
                log::warn!("Layer {} had failures, skipping dependent steps", layer_idx + 1);
                self.skip_dependents(layer_names, &layers[layer_idx + 1..], &mut result, &step_map);
                break;
            }
        }

        result.completed_at = Utc::now().to_rfc3339();
        result.status = if result.has_failures() {
            "failed"
        } else if result.all_completed() {
            "completed"
        } else {
            "partial"
        }
        .to_string();

        if let (Ok(start), Ok(end)) = (
            chrono::DateTime::parse_from_rfc3339(&result.started_at),
            chrono::DateTime::parse_from_rfc3339(&result.completed_at),
        ) {
            result.total_duration_seconds = (end - start).num_milliseconds() as f64 / 1000.0;
        }

        log::info!("Workflow '{}' {}: {:.1}s", workflow.name, result.status, result.total_duration_seconds);
        Ok(result)
    }

    async fn execute_step(&self, step_def: StepDef, resolved_prompt: String) -> StepResult {
        let mut step_result = StepResult::new(step_def.name.clone());
        step_result.mark_running();

        let default_profile = AgentProfile::default();
        let profile = self.config.agents.profiles.get(&step_def.profile).unwrap_or(&default_profile);
        let model_override = if profile.model.is_empty() { None } else { Some(profile.model.as_str()) };
        let session_key = format!("workflow:{}", step_def.name);

        let run = self.engine.run(&resolved_prompt, &session_key, model_override);
        match tokio::time::timeout(std::time::Duration::from_secs(step_def.timeout_seconds), run).await {
            Ok(Ok(agent_result)) => {
                step_result.mark_completed(agent_result.response, agent_result.iterations);
                log::info!(
                    "Step '{}' completed: {} iterations, {:.1}s",
                    step_def.name,
                    agent_result.iterations,
                    step_result.duration_seconds
                );
            }
            Ok(Err(e)) => {
                step_result.mark_failed(e.to_string());
                log::error!("Step '{}' failed: {e}", step_def.name);
            }
            Err(_) => {
                step_result.mark_failed(format!("Timed out after {}s", step_def.timeout_seconds));
                log::error!("Step '{}' timed out", step_def.name);
            }
        }
        step_result
    }

    fn resolve_template(&self, prompt: &str, step_results: &HashMap<String, StepResult>) -> String {
        template_pattern()
            .replace_all(prompt, |caps: &regex::Captures| {
                let step_name = &caps[1];
                match step_results.get(step_name) {
                    Some(r) if r.status == StepStatus::Completed => r.output.clone(),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn skip_dependents(
        &self,
        failed_layer: &[String],
        remaining_layers: &[Vec<String>],
        result: &mut WorkflowRunResult,
        step_map: &HashMap<String, StepDef>,
    ) {
        let mut failed_set: HashSet<String> = failed_layer
            .iter()
            .filter(|n| result.step_results[*n].status == StepStatus::Failed)
            .cloned()
            .collect();

        for layer in remaining_layers {
            for step_name in layer {
                let step_def = &step_map[step_name];
                if step_def.depends_on.iter().any(|dep| failed_set.contains(dep)) {
                    if let Some(r) = result.step_results.get_mut(step_name) {
                        r.status = StepStatus::Skipped;
                        r.error = "Skipped due to dependency failure".to_string();
                    }
                    failed_set.insert(step_name.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentRunResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct StubEngine {
        calls: Mutex<Vec<String>>,
        fail: HashSet<String>,
    }

    #[async_trait]
    impl Engine for StubEngine {
        async fn run(&self, user_message: &str, session_key: &str, _model: Option<&str>) -> GripResult<AgentRunResult> {
            self.calls.lock().push(session_key.to_string());
            let step_name = session_key.trim_start_matches("workflow:");
            if self.fail.contains(step_name) {
                return Err(GripError::Other("boom".to_string()));
            }
            Ok(AgentRunResult {
                response: format!("output-of-{step_name}:{user_message}"),
                iterations: 1,
                prompt_tokens: 10,
                completion_tokens: 10,
                tool_calls_made: vec![],
                tool_details: vec![],
            })
        }

        async fn consolidate_session(&self, _session_key: &str) -> GripResult<()> {
            Ok(())
        }

        async fn reset_session(&self, _session_key: &str) -> GripResult<()> {
            Ok(())
        }
    }

    fn step(name: &str, prompt: &str, deps: &[&str]) -> StepDef {
        StepDef {
            name: name.to_string(),
            prompt: prompt.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            timeout_seconds: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolves_template_and_completes() {
        let wf = WorkflowDef {
            name: "pipeline".to_string(),
            steps: vec![
                step("fetch", "get data", &[]),
                step("summarize", "summarize: {{fetch.output}}", &["fetch"]),
            ],
            ..Default::default()
        };
        let stub = Arc::new(StubEngine { calls: Mutex::new(vec![]), fail: HashSet::new() });
        let wf_engine = WorkflowEngine::new(Arc::new(GripConfig::default()), stub.clone());

        let result = wf_engine.run(&wf).await.unwrap();
        assert_eq!(result.status, "completed");
        assert_eq!(result.step_results["fetch"].status, StepStatus::Completed);
        assert_eq!(result.step_results["summarize"].status, StepStatus::Completed);
        assert!(result.step_results["summarize"].output.contains("output-of-fetch:get data"));
    }

    #[tokio::test]
    async fn failed_step_skips_dependents() {
        let wf = WorkflowDef {
            name: "pipeline".to_string(),
            steps: vec![
                step("a", "do a", &[]),
                step("b", "do b depending on {{a.output}}", &["a"]),
            ],
            ..Default::default()
        };
        let mut fail = HashSet::new();
        fail.insert("a".to_string());
        let stub = Arc::new(StubEngine { calls: Mutex::new(vec![]), fail });
        let wf_engine = WorkflowEngine::new(Arc::new(GripConfig::default()), stub);

        let result = wf_engine.run(&wf).await.unwrap();
        assert_eq!(result.status, "failed");
        assert_eq!(result.step_results["a"].status, StepStatus::Failed);
        assert_eq!(result.step_results["b"].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn invalid_workflow_rejected_before_running() {
        let wf = WorkflowDef {
            name: "bad".to_string(),
            steps: vec![step("a", "x", &["nonexistent"])],
            ..Default::default()
        };
        let stub = Arc::new(StubEngine { calls: Mutex::new(vec![]), fail: HashSet::new() });
        let wf_engine = WorkflowEngine::new(Arc::new(GripConfig::default()), stub.clone());

        let err = wf_engine.run(&wf).await.unwrap_err();
        assert!(matches!(err, GripError::WorkflowValidation(_)));
        assert!(stub.calls.lock().is_empty());
    }
}
