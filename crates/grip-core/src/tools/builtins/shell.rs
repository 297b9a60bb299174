//! `exec` tool: run a shell command in the workspace, with a denylist
//! of destructive patterns checked before anything is spawned.

use crate::tools::base::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;

const MAX_OUTPUT_BYTES: usize = 50_000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_TIMEOUT_SECS: u64 = 600;

static DANGEROUS_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"rm\s+-[a-z]*r[a-z]*f",
        r"rm\s+-[a-z]*f[a-z]*r",
        r":\(\)\s*\{\s*:\|\s*:&\s*\}",
        r"mkfs\.",
        r">\s*/dev/sd[a-z]",
        r"dd\s+.*of=/dev/",
        r"chmod\s+-R\s+777\s+/",
        r"chown\s+-R\s+.*\s+/\s*$",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).expect("valid dangerous-pattern regex"))
    .collect()
});

/// Check `command` against the shell denylist. Shared with the SDK
/// engine's pre-tool-use hook so both engines refuse the same commands.
pub(crate) fn dangerous_match(command: &str) -> Option<&'static str> {
    let lowered = command.to_lowercase();
    DANGEROUS_PATTERNS
        .iter()
        .find(|re| re.is_match(&lowered))
        .map(|re| re.as_str())
}

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the agent workspace and return its stdout/stderr."
    }

    fn category(&self) -> &str {
        "shell"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to run"},
                "timeout": {"type": "integer", "description": "Timeout in seconds (default 120, max 600)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> String {
        let Some(command) = params["command"].as_str() else {
            return "Error: missing 'command' argument".to_string();
        };

        if let Some(pattern) = dangerous_match(command) {
            log::warn!("Blocked dangerous shell command matching {pattern}: {command}");
            return format!("Error: matches dangerous pattern '{pattern}'. Refusing to run '{command}'.");
        }

        if ctx.dry_run() {
            return format!("[dry run] would execute: {command}");
        }

        let requested = params["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout_secs = requested.min(MAX_TIMEOUT_SECS).min(ctx.shell_timeout.max(1));

        let mut child = if cfg!(target_os = "windows") {
            tokio::process::Command::new("cmd")
                .args(["/C", command])
                .current_dir(&ctx.workspace_path)
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
        } else {
            tokio::process::Command::new("sh")
                .args(["-c", command])
                .current_dir(&ctx.workspace_path)
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
        };

        let mut child = match child {
            Ok(c) => c,
            Err(e) => return format!("Error executing {command}: spawn failed: {e}"),
        };
        child.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await;
        match output {
            Err(_) => format!("Error: command timed out after {timeout_secs}s"),
            Ok(Err(e)) => format!("Error executing {command}: {e}"),
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let stderr = String::from_utf8_lossy(&out.stderr);
                let mut result = String::new();
                result.push_str(&stdout);
                if !stderr.is_empty() {
                    if !result.is_empty() {
                        result.push_str("\n--- stderr ---\n");
                    }
                    result.push_str(&stderr);
                }
                if result.is_empty() {
                    result = format!("(exit code: {})", out.status.code().unwrap_or(-1));
                }
                if result.len() > MAX_OUTPUT_BYTES {
                    result.truncate(MAX_OUTPUT_BYTES);
                    result.push_str("\n\n... [output truncated]");
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let tool = ShellTool;
        let out = tool.execute(&json!({"command": "echo hi"}), &ctx).await;
        assert_eq!(out.trim(), "hi");
    }

    #[tokio::test]
    async fn blocks_dangerous_rm() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let tool = ShellTool;
        let out = tool.execute(&json!({"command": "rm -rf /"}), &ctx).await;
        assert!(out.starts_with("Error: matches dangerous pattern"));
    }

    #[tokio::test]
    async fn dry_run_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ToolContext::new(dir.path());
        ctx.extra.insert("dry_run".to_string(), json!(true));
        let tool = ShellTool;
        let out = tool.execute(&json!({"command": "echo hi"}), &ctx).await;
        assert!(out.starts_with("[dry run]"));
    }
}
