//! Transparent decorator that mines behavioral patterns out of every
//! turn using zero-LLM rule-based heuristics, and stores them in a
//! [`KnowledgeBase`] for future system-prompt injection.

use crate::error::GripResult;
use crate::memory::{KnowledgeBase, PatternExtractor};
use crate::types::AgentRunResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::Engine;

pub struct LearningEngine {
    inner: Arc<dyn Engine>,
    knowledge_base: Arc<KnowledgeBase>,
    extractor: Mutex<PatternExtractor>,
}

impl LearningEngine {
    pub fn new(inner: Arc<dyn Engine>, knowledge_base: Arc<KnowledgeBase>, extractor: PatternExtractor) -> Self {
        Self { inner, knowledge_base, extractor: Mutex::new(extractor) }
    }

    /// Expose the KB for status queries (e.g. `grip status`).
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }
}

#[async_trait]
impl Engine for LearningEngine {
    async fn run(&self, user_message: &str, session_key: &str, model: Option<&str>) -> GripResult<AgentRunResult> {
        let result = self.inner.run(user_message, session_key, model).await?;

        let patterns = self.extractor.lock().extract(user_message, &result.response, &result.tool_calls_made);
        let count = patterns.len();
        for p in patterns {
            if let Err(e) = self.knowledge_base.add(&p.category, &p.content, &p.source, p.tags) {
                log::debug!("Behavioral extraction failed to store a pattern (non-fatal): {e}");
            }
        }
        if count > 0 {
            log::debug!("Extracted {count} behavioral pattern(s) from interaction");
        }

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
    use async_trait::async_trait;

    struct StubEngine;

    #[async_trait]
    impl Engine for StubEngine {
        async fn run(&self, _user_message: &str, _session_key: &str, _model: Option<&str>) -> GripResult<AgentRunResult> {
            Ok(AgentRunResult {
                response: "Error: connection refused".to_string(),
                iterations: 1,
                prompt_tokens: 0,
                completion_tokens: 0,
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
    async fn extracts_and_stores_patterns_without_altering_result() {
        let dir = tempfile::tempdir().unwrap();
        let kb = Arc::new(KnowledgeBase::new(dir.path()).unwrap());
        let engine = LearningEngine::new(Arc::new(StubEngine), kb.clone(), PatternExtractor::new());

        let result = engine.run("I prefer dark mode for everything", "cli:default", None).await.unwrap();
        assert_eq!(result.response, "Error: connection refused");
        assert!(kb.count() > 0);
    }
}
