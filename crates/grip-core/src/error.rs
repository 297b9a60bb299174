//! Single canonical error enum for the engine, built with `thiserror`.
//!
//! Variants are coarse-grained by domain and mirror the error kinds
//! enumerated in the component design for provider/tool/workflow
//! failures. No variant carries secret material (API keys, tokens) in
//! its message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GripError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Engine or agent configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad or missing provider credentials. Never retried.
    #[error("[{provider}] Authentication failed — your API key is invalid or missing. {hint}")]
    ProviderAuth { provider: String, hint: String },

    /// Provider rate limit exceeded. Retried up to 3 times with backoff.
    #[error("[{provider}] Rate limit exceeded — too many requests. {hint}")]
    ProviderRateLimit { provider: String, hint: String },

    /// Account has insufficient credits or quota. Never retried.
    #[error("[{provider}] Insufficient credits or quota. {hint}")]
    ProviderInsufficientQuota { provider: String, hint: String },

    /// Requested model does not exist on the provider. Never retried.
    #[error("[{provider}] Model not found: {model}. {hint}")]
    ProviderModelNotFound { provider: String, model: String, hint: String },

    /// Provider returned a 5xx server error. Retried up to 3 times.
    #[error("[{provider}] Server error: {message}")]
    ProviderServer { provider: String, message: String },

    /// Cannot reach the provider's API endpoint. Retried up to 3 times.
    #[error("[{provider}] Connection error: {message}")]
    ProviderConnection { provider: String, message: String },

    /// Provider request timed out. Retried up to 3 times.
    #[error("[{provider}] Timeout: {message}")]
    ProviderTimeout { provider: String, message: String },

    /// Any other provider-level failure not covered by a specific variant.
    #[error("[{provider}] {message}")]
    ProviderOther { provider: String, message: String },

    /// Daily token budget would be exceeded. Raised before the provider call.
    #[error(
        "Daily token limit exceeded: {used} used of {limit} allowed. Resets at midnight UTC."
    )]
    TokenLimitExceeded { used: u64, limit: u64 },

    /// OAuth login-level failure (state mismatch, exchange failure, timeout).
    #[error("OAuth flow error: {0}")]
    OAuthFlowError(String),

    /// Workflow DAG failed validation before execution started.
    #[error("Workflow validation error: {0}")]
    WorkflowValidation(String),

    /// A workflow step exceeded its configured timeout.
    #[error("Step '{step}' timed out after {seconds}s")]
    StepTimeout { step: String, seconds: u64 },

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

/// Substrings that mark an unclassified provider error as transient.
/// Checked case-insensitively against the error message as a fallback
/// when the error didn't already sort into a specific retryable variant.
const RETRYABLE_HINTS: [&str; 4] = ["rate limit", "timeout", "overloaded", "503"];

impl GripError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GripError::ProviderRateLimit { .. }
            | GripError::ProviderServer { .. }
            | GripError::ProviderConnection { .. }
            | GripError::ProviderTimeout { .. } => true,
            GripError::ProviderOther { message, .. } => {
                let lower = message.to_lowercase();
                RETRYABLE_HINTS.iter().any(|hint| lower.contains(hint))
            }
            _ => false,
        }
    }
}

impl From<String> for GripError {
    fn from(s: String) -> Self {
        GripError::Other(s)
    }
}

impl From<&str> for GripError {
    fn from(s: &str) -> Self {
        GripError::Other(s.to_string())
    }
}

pub type GripResult<T> = Result<T, GripError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_other_retries_on_hint_keywords() {
        let err = GripError::ProviderOther { provider: "x".into(), message: "upstream is Overloaded right now".into() };
        assert!(err.is_retryable());
    }

    #[test]
    fn provider_other_is_not_retried_without_a_hint() {
        let err = GripError::ProviderOther { provider: "x".into(), message: "unexpected response shape".into() };
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_auth_is_never_retried() {
        let err = GripError::ProviderAuth { provider: "x".into(), hint: "check your key".into() };
        assert!(!err.is_retryable());
    }
}
