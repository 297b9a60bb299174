//! Shared state handed to every route handler: the live config (held
//! behind a lock since `enable`/`disable` mutate and persist it), the
//! MCP manager, pending gateway-mediated OAuth logins, and the rate
//! limiter.

use crate::rate_limit::RateLimiter;
use grip_core::config::GripConfig;
use grip_core::mcp::McpManager;
use grip_core::security::PendingOAuthStates;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

pub struct GatewayState {
    pub config: RwLock<Arc<GripConfig>>,
    pub config_path: Option<PathBuf>,
    pub mcp: Arc<McpManager>,
    pub pending_oauth: Arc<PendingOAuthStates>,
    pub rate_limiter: RateLimiter,
}

impl GatewayState {
    pub fn config(&self) -> Arc<GripConfig> {
        self.config.read().clone()
    }
}
