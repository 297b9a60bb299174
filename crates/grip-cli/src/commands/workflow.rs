use crate::app::AppContext;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum WorkflowAction {
    /// Validate and run a saved workflow by name.
    Run { name: String },
    /// Validate a saved workflow's DAG without running it.
    Validate { name: String },
    /// List every saved workflow.
    List,
}

pub async fn dispatch(ctx: &AppContext, action: WorkflowAction) -> Result<(), String> {
    match action {
        WorkflowAction::Run { name } => {
            let workflow = ctx.workflow_store.load(&name).ok_or_else(|| format!("no such workflow: {name}"))?;
            let result = ctx.workflow_engine.run(&workflow).await.map_err(|e| e.to_string())?;
            println!("Workflow '{}' finished: {}", result.workflow_name, result.status);
            let mut names: Vec<&String> = result.step_results.keys().collect();
            names.sort();
            for step_name in names {
                let step = &result.step_results[step_name];
                println!("  [{:?}] {}", step.status, step_name);
                if !step.output.is_empty() {
                    println!("    output: {}", step.output);
                }
                if !step.error.is_empty() {
                    println!("    error: {}", step.error);
                }
            }
            if result.has_failures() {
                return Err("one or more workflow steps failed".to_string());
            }
            Ok(())
        }
        WorkflowAction::Validate { name } => {
            let workflow = ctx.workflow_store.load(&name).ok_or_else(|| format!("no such workflow: {name}"))?;
            let errors = workflow.validate();
            if errors.is_empty() {
                println!("'{name}' is valid.");
                Ok(())
            } else {
                for error in &errors {
                    eprintln!("  - {error}");
                }
                Err(format!("'{name}' failed validation with {} error(s)", errors.len()))
            }
        }
        WorkflowAction::List => {
            for name in ctx.workflow_store.list_workflows() {
                println!("{name}");
            }
            Ok(())
        }
    }
}
