//! Filesystem tools: `read_file`, `write_file`, `list_directory`.
//! All three resolve their path through `super::resolve_path` and,
//! when the result falls outside the workspace, defer to the trust
//! manager before touching disk.

use super::{ensure_trusted, human_size, resolve_path};
use crate::security::trust::TrustManager;
use crate::tools::base::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_READ_BYTES: usize = 32_000;

pub struct ReadFileTool {
    pub trust: Option<Arc<TrustManager>>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file."
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute or workspace-relative file path"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> String {
        let Some(raw) = params["path"].as_str() else {
            return "Error: missing 'path' argument".to_string();
        };
        let resolved = match resolve_path(raw, &ctx.workspace_path, ctx.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };
        if let Some(denied) = ensure_trusted(&resolved, &ctx.workspace_path, self.trust.as_ref()).await {
            return denied;
        }

        match std::fs::read_to_string(&resolved) {
            Ok(content) if content.len() > MAX_READ_BYTES => {
                format!("{}...\n[truncated, {} total bytes]", &content[..MAX_READ_BYTES], content.len())
            }
            Ok(content) => content,
            Err(e) => format!("Error reading '{}': {e}", resolved.display()),
        }
    }
}

pub struct WriteFileTool {
    pub trust: Option<Arc<TrustManager>>,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and parent directories) if needed and overwriting if it exists."
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute or workspace-relative file path"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> String {
        let Some(raw) = params["path"].as_str() else {
            return "Error: missing 'path' argument".to_string();
        };
        let Some(content) = params["content"].as_str() else {
            return "Error: missing 'content' argument".to_string();
        };
        let resolved = match resolve_path(raw, &ctx.workspace_path, ctx.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };
        if let Some(denied) = ensure_trusted(&resolved, &ctx.workspace_path, self.trust.as_ref()).await {
            return denied;
        }
        if ctx.dry_run() {
            return format!("[dry run] would write {} bytes to {}", content.len(), resolved.display());
        }

        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return format!("Error creating parent directories for '{}': {e}", resolved.display());
            }
        }
        match std::fs::write(&resolved, content) {
            Ok(()) => format!("Wrote {} to {}", human_size(content.len() as u64), resolved.display()),
            Err(e) => format!("Error writing '{}': {e}", resolved.display()),
        }
    }
}

pub struct ListDirectoryTool {
    pub trust: Option<Arc<TrustManager>>,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and subdirectories in a directory, with sizes."
    }

    fn category(&self) -> &str {
        "filesystem"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path (default: workspace root)"}
            }
        })
    }

    async fn execute(&self, params: &Value, ctx: &ToolContext) -> String {
        let raw = params["path"].as_str().unwrap_or(".");
        let resolved = match resolve_path(raw, &ctx.workspace_path, ctx.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };
        if let Some(denied) = ensure_trusted(&resolved, &ctx.workspace_path, self.trust.as_ref()).await {
            return denied;
        }

        let entries = match std::fs::read_dir(&resolved) {
            Ok(rd) => rd,
            Err(e) => return format!("Error listing '{}': {e}", resolved.display()),
        };

        let mut rows: Vec<(String, bool, u64)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                Some((e.file_name().to_string_lossy().into_owned(), meta.is_dir(), meta.len()))
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        if rows.is_empty() {
            return format!("'{}' is empty.", resolved.display());
        }

        let lines: Vec<String> = rows
            .into_iter()
            .map(|(name, is_dir, size)| {
                if is_dir {
                    format!("{name}/")
                } else {
                    format!("{name} ({})", human_size(size))
                }
            })
            .collect();
        format!("Contents of '{}':\n{}", resolved.display(), lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let write = WriteFileTool { trust: None };
        let out = write.execute(&json!({"path": "notes.txt", "content": "hello"}), &ctx).await;
        assert!(out.starts_with("Wrote"));

        let read = ReadFileTool { trust: None };
        let content = read.execute(&json!({"path": "notes.txt"}), &ctx).await;
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn list_directory_reports_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolContext::new(dir.path());
        let list = ListDirectoryTool { trust: None };
        let out = list.execute(&json!({}), &ctx).await;
        assert!(out.contains("a.txt"));
        assert!(out.contains("sub/"));
    }

    #[tokio::test]
    async fn read_missing_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let read = ReadFileTool { trust: None };
        let out = read.execute(&json!({"path": "nope.txt"}), &ctx).await;
        assert!(out.starts_with("Error"));
    }
}
