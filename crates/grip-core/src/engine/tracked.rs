//! Transparent decorator that enforces the daily token budget around
//! any inner [`Engine`].

use crate::error::GripResult;
use crate::security::TokenTracker;
use crate::types::AgentRunResult;
use async_trait::async_trait;
use std::sync::Arc;

use super::Engine;

/// Checks the daily limit before delegating and records usage after a
/// successful run. A `TokenLimitExceeded` error from `check_limit`
/// propagates to the caller without ever reaching the inner engine.
pub struct TrackedEngine {
    inner: Arc<dyn Engine>,
    tracker: Arc<TokenTracker>,
}

impl TrackedEngine {
    pub fn new(inner: Arc<dyn Engine>, tracker: Arc<TokenTracker>) -> Self {
        Self { inner, tracker }
    }

    /// Expose the tracker for status queries (e.g. `grip status`).
    pub fn tracker(&self) -> &TokenTracker {
        &self.tracker
    }
}

#[async_trait]
impl Engine for TrackedEngine {
    async fn run(&self, user_message: &str, session_key: &str, model: Option<&str>) -> GripResult<AgentRunResult> {
        self.tracker.check_limit()?;
        let result = self.inner.run(user_message, session_key, model).await?;
        self.tracker.record(result.prompt_tokens, result.completion_tokens)?;
        Ok(result)
    }

    async fn consolidate_session(&self, session_key: &str) -> GripResult<()> {
        self.inner.consolidate_session(session_key).await
    }

    async fn reset_session(&self, session_key: &str) -> GripResult<()> {
        self.inner.reset_session(session_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentRunResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubEngine {
        prompt_tokens: u64,
        completion_tokens: u64,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Engine for StubEngine {
        async fn run(&self, _user_message: &str, _session_key: &str, _model: Option<&str>) -> GripResult<AgentRunResult> {
            *self.calls.lock().unwrap() += 1;
            Ok(AgentRunResult {
                response: "ok".to_string(),
                iterations: 1,
                prompt_tokens: self.prompt_tokens,
                completion_tokens: self.completion_tokens,
                tool_calls_made: Vec::new(),
                tool_details: Vec::new(),
            })
        }

        async fn consolidate_session(&self, _session_key: &str) -> GripResult<()> {
            Ok(())
        }

        async fn reset_session(&self, _session_key: &str) -> GripResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_usage_after_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubEngine { prompt_tokens: 100, completion_tokens: 50, calls: Mutex::new(0) });
        let tracker = Arc::new(TokenTracker::new(dir.path(), 10_000).unwrap());
        let engine = TrackedEngine::new(stub, tracker);

        let result = engine.run("hi", "cli:default", None).await.unwrap();
        assert_eq!(result.response, "ok");
        assert_eq!(engine.tracker().total_today(), 150);
    }

    #[tokio::test]
    async fn blocks_run_when_daily_limit_already_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubEngine { prompt_tokens: 10, completion_tokens: 10, calls: Mutex::new(0) });
        let tracker = Arc::new(TokenTracker::new(dir.path(), 100).unwrap());
        tracker.record(90, 20).unwrap();
        let engine = TrackedEngine::new(stub, tracker);

        let result = engine.run("hi", "cli:default", None).await;
        assert!(result.is_err());
    }
}
