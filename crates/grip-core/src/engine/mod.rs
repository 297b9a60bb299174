//! The dual-engine abstraction: a single [`Engine`] trait with two
//! independent implementations (the provider-agnostic [`AgentLoop`]
//! and the delegated [`SdkEngine`]) plus two transparent decorators
//! ([`TrackedEngine`], [`LearningEngine`]) that wrap either one
//! without the caller knowing the difference.

pub mod agent_loop;
pub mod factory;
pub mod learning;
pub mod sdk_engine;
pub mod tracked;

use crate::error::GripResult;
use crate::types::AgentRunResult;
use async_trait::async_trait;

pub use agent_loop::AgentLoop;
pub use factory::create_engine;
pub use learning::LearningEngine;
pub use sdk_engine::SdkEngine;
pub use tracked::TrackedEngine;

/// Common contract both engines satisfy, so gateways and channels can
/// run a turn without knowing which implementation is behind it.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run one turn: append `user_message` to the named session, drive
    /// the model/tool loop (or delegate to the SDK), persist the
    /// result, and return it.
    async fn run(
        &self,
        user_message: &str,
        session_key: &str,
        model: Option<&str>,
    ) -> GripResult<AgentRunResult>;

    /// Summarize and compact a session's older history. A no-op for
    /// engines that manage their own context window internally.
    async fn consolidate_session(&self, session_key: &str) -> GripResult<()>;

    /// Clear all persisted state for a session.
    async fn reset_session(&self, session_key: &str) -> GripResult<()>;
}
