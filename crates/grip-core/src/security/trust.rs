//! Directory trust manager for filesystem tool access control.
//!
//! When `tools.restrict_to_workspace` is false, grip trusts the
//! workspace directory plus any directory the user has explicitly
//! granted trust to (and all of its subdirectories), persisted to
//! `<state_dir>/trusted_dirs.json`. In CLI mode the caller wires an
//! interactive [`TrustPrompt`]; in gateway mode no prompt is set and
//! untrusted access is denied silently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Interactive callback asked to approve trusting `path`.
#[async_trait]
pub trait TrustPrompt: Send + Sync {
    async fn ask(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrustedDirsFile {
    directories: Vec<String>,
}

struct State {
    trusted: HashSet<String>,
    denied_this_session: HashSet<String>,
}

pub struct TrustManager {
    state_file: PathBuf,
    state: AsyncMutex<State>,
    prompt: Option<Arc<dyn TrustPrompt>>,
}

impl TrustManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_file = state_dir.into().join("trusted_dirs.json");
        let trusted = Self::load(&state_file);
        Self {
            state_file,
            state: AsyncMutex::new(State { trusted, denied_this_session: HashSet::new() }),
            prompt: None,
        }
    }

    fn load(state_file: &Path) -> HashSet<String> {
        let Ok(text) = std::fs::read_to_string(state_file) else { return HashSet::new() };
        match serde_json::from_str::<TrustedDirsFile>(&text) {
            Ok(file) => file.directories.into_iter().collect(),
            Err(e) => {
                log::warn!("Failed to load trusted_dirs.json: {e}");
                HashSet::new()
            }
        }
    }

    fn save(&self, trusted: &HashSet<String>) {
        let Some(parent) = self.state_file.parent() else { return };
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
        let mut dirs: Vec<String> = trusted.iter().cloned().collect();
        dirs.sort();
        let file = TrustedDirsFile { directories: dirs };
        if let Ok(json) = serde_json::to_string_pretty(&file) {
            let _ = std::fs::write(&self.state_file, json);
        }
    }

    /// Register the async callback used to prompt the user for trust decisions.
    pub fn set_prompt(&mut self, prompt: Arc<dyn TrustPrompt>) {
        self.prompt = Some(prompt);
    }

    pub async fn trusted_directories(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut dirs: Vec<String> = state.trusted.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    async fn is_trusted_locked(path: &Path, workspace: &Path, trusted: &HashSet<String>) -> bool {
        let resolved = resolve(path);
        let ws = resolve(workspace);
        if resolved == ws || is_subpath(&resolved, &ws) {
            return true;
        }
        trusted.iter().any(|td| {
            let td_path = PathBuf::from(td);
            resolved == td_path || is_subpath(&resolved, &td_path)
        })
    }

    pub async fn is_trusted(&self, path: &Path, workspace: &Path) -> bool {
        let state = self.state.lock().await;
        Self::is_trusted_locked(path, workspace, &state.trusted).await
    }

    /// Top-level directory to trust for `path`: the first path segment
    /// under the home directory when `path` is under it, otherwise the
    /// first directory component after the filesystem root.
    pub fn find_trust_target(path: &Path) -> PathBuf {
        let resolved = resolve(path);
        let home = dirs::home_dir().map(|h| resolve(&h));

        if let Some(home) = &home {
            if let Ok(relative) = resolved.strip_prefix(home) {
                return match relative.components().next() {
                    Some(first) => home.join(first.as_os_str()),
                    None => resolved,
                };
            }
        }

        let mut components = resolved.components();
        let root = components.next();
        match (root, components.next()) {
            (Some(root), Some(first)) => PathBuf::from(root.as_os_str()).join(first.as_os_str()),
            _ => resolved,
        }
    }

    pub async fn trust(&self, directory: &Path) {
        let resolved = resolve(directory).to_string_lossy().to_string();
        let mut state = self.state.lock().await;
        state.trusted.insert(resolved.clone());
        state.denied_this_session.remove(&resolved);
        self.save(&state.trusted);
        log::info!("Trusted directory: {resolved}");
    }

    pub async fn revoke(&self, directory: &Path) -> bool {
        let resolved = resolve(directory).to_string_lossy().to_string();
        let mut state = self.state.lock().await;
        if state.trusted.remove(&resolved) {
            self.save(&state.trusted);
            log::info!("Revoked trust for: {resolved}");
            true
        } else {
            false
        }
    }

    /// Check trust, prompting the user if a callback is registered and
    /// the path hasn't already been denied this session. The async
    /// lock serializes concurrent prompts for the same path so
    /// parallel tool calls don't open duplicate prompts.
    pub async fn check_and_prompt(&self, path: &Path, workspace: &Path) -> bool {
        {
            let state = self.state.lock().await;
            if Self::is_trusted_locked(path, workspace, &state.trusted).await {
                return true;
            }
        }

        let target = Self::find_trust_target(path);
        let target_str = target.to_string_lossy().to_string();

        let mut state = self.state.lock().await;
        if state.denied_this_session.contains(&target_str) {
            return false;
        }
        if Self::is_trusted_locked(path, workspace, &state.trusted).await {
            return true;
        }

        let Some(prompt) = &self.prompt else { return false };
        let granted = prompt.ask(&target).await;
        if granted {
            state.trusted.insert(target_str.clone());
            state.denied_this_session.remove(&target_str);
            self.save(&state.trusted);
            log::info!("Trusted directory: {target_str}");
            true
        } else {
            state.denied_this_session.insert(target_str);
            false
        }
    }
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_subpath(child: &Path, parent: &Path) -> bool {
    child.starts_with(parent) && child != parent
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysGrant;
    #[async_trait]
    impl TrustPrompt for AlwaysGrant {
        async fn ask(&self, _path: &Path) -> bool {
            true
        }
    }

    struct AlwaysDeny;
    #[async_trait]
    impl TrustPrompt for AlwaysDeny {
        async fn ask(&self, _path: &Path) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn workspace_is_always_trusted() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let manager = TrustManager::new(dir.path());
        assert!(manager.is_trusted(&ws, &ws).await);
        assert!(manager.is_trusted(&ws.join("sub/file.txt"), &ws).await);
    }

    #[tokio::test]
    async fn outside_workspace_untrusted_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        let other = dir.path().join("other");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        let manager = TrustManager::new(dir.path());
        assert!(!manager.check_and_prompt(&other, &ws).await);
    }

    #[tokio::test]
    async fn prompt_grant_persists_trust() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        let other = dir.path().join("other");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        let mut manager = TrustManager::new(dir.path());
        manager.set_prompt(Arc::new(AlwaysGrant));
        assert!(manager.check_and_prompt(&other.join("file.txt"), &ws).await);
        assert!(manager.is_trusted(&other, &ws).await);
    }

    #[tokio::test]
    async fn denied_prompt_is_not_re_prompted_this_session() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("ws");
        let other = dir.path().join("other");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::create_dir_all(&other).unwrap();
        let mut manager = TrustManager::new(dir.path());
        manager.set_prompt(Arc::new(AlwaysDeny));
        assert!(!manager.check_and_prompt(&other, &ws).await);
        assert_eq!(manager.trusted_directories().await.len(), 0);
    }

    #[test]
    fn find_trust_target_uses_first_home_child() {
        let home = dirs::home_dir().unwrap();
        let path = home.join("Downloads").join("project").join("file.txt");
        let target = TrustManager::find_trust_target(&path);
        assert_eq!(target, resolve(&home).join("Downloads"));
    }
}
