//! Built-in tool bodies, grouped by the module that backs them.

pub mod filesystem;
pub mod memory;
pub mod shell;
pub mod subagent;
pub mod web;

use crate::memory::MemoryManager;
use crate::security::trust::TrustManager;
use crate::subagent::SubagentManager;
use crate::tools::base::Tool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve a user-supplied path against the workspace. Relative paths
/// resolve against the workspace root; when `restrict_to_workspace` is
/// set, any path that escapes it is rejected.
pub(crate) fn resolve_path(raw: &str, workspace: &Path, restrict_to_workspace: bool) -> Result<PathBuf, String> {
    let expanded = shellexpand_home(raw);
    let p = PathBuf::from(expanded);
    let p = if p.is_absolute() { p } else { workspace.join(p) };
    let resolved = normalize(&p);

    if restrict_to_workspace {
        let ws = normalize(workspace);
        if !resolved.starts_with(&ws) {
            return Err(format!(
                "Path '{raw}' resolves outside workspace. Workspace: {}",
                ws.display()
            ));
        }
    }
    Ok(resolved)
}

/// Lexical path normalization (no symlink resolution, so it works on
/// paths that do not yet exist — unlike `fs::canonicalize`).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn shellexpand_home(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    raw.to_string()
}

/// Consult the trust manager (if any) for a resolved path outside the
/// workspace. Returns `None` when access is allowed, `Some(error)`
/// when denied.
pub(crate) async fn ensure_trusted(
    resolved: &Path,
    workspace: &Path,
    trust: Option<&Arc<TrustManager>>,
) -> Option<String> {
    let trust = trust?;
    if trust.check_and_prompt(resolved, workspace).await {
        return None;
    }
    let target = TrustManager::find_trust_target(resolved);
    Some(format!(
        "Error: Access denied — '{}' is not a trusted directory. The agent can only access the \
         workspace ({}) and explicitly trusted directories. Use /trust {} to grant access.",
        target.display(),
        workspace.display(),
        target.display()
    ))
}

fn human_size(mut bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    for (i, unit) in UNITS.iter().enumerate() {
        if bytes < 1024 || i == UNITS.len() - 1 {
            return if i == 0 { format!("{value:.0}{unit}") } else { format!("{value:.1}{unit}") };
        }
        bytes /= 1024;
        value /= 1024.0;
    }
    format!("{value:.1}TB")
}

/// Build the representative built-in tool set described by the tool
/// registry's non-goal: filesystem, shell, web fetch, memory, and
/// subagent control.
pub fn create_builtin_tools(
    memory: Arc<MemoryManager>,
    subagents: Arc<SubagentManager>,
    trust: Option<Arc<TrustManager>>,
) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(filesystem::ReadFileTool { trust: trust.clone() }),
        Arc::new(filesystem::WriteFileTool { trust: trust.clone() }),
        Arc::new(filesystem::ListDirectoryTool { trust: trust.clone() }),
        Arc::new(shell::ShellTool),
        Arc::new(web::FetchTool),
        Arc::new(memory::SearchMemoryTool { memory: memory.clone() }),
        Arc::new(memory::MemoryStoreTool { memory }),
    ];
    tools.extend(subagent::create_subagent_tools(subagents));
    tools
}
