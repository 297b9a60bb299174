//! Maps provider HTTP status codes to `GripError` variants, with
//! actionable hints, per the provider error classification table.

use crate::error::GripError;

/// Build the right `GripError` variant for an HTTP status returned by
/// a provider. Call this instead of bubbling a raw `reqwest::Error`
/// so callers get a classification they can retry on.
pub fn classify_status(
    status: u16,
    provider: &str,
    model: &str,
    raw_message: &str,
) -> GripError {
    let detail = if raw_message.is_empty() {
        String::new()
    } else {
        let short: String = raw_message.chars().take(200).collect();
        format!(" Detail: {}", short.replace('\n', " "))
    };

    match status {
        401 => GripError::ProviderAuth {
            provider: provider.to_string(),
            hint: format!(
                "Run `grip config set providers.{provider}.api_key` to fix it.{detail}"
            ),
        },
        403 => GripError::ProviderAuth {
            provider: provider.to_string(),
            hint: format!("Your API key lacks permission for this resource.{detail}"),
        },
        404 => GripError::ProviderModelNotFound {
            provider: provider.to_string(),
            model: model.to_string(),
            hint: format!(
                "Run `grip config set agents.defaults.model MODEL_NAME` with a valid model.{detail}"
            ),
        },
        402 => GripError::ProviderInsufficientQuota {
            provider: provider.to_string(),
            hint: format!("Add credits on your provider's billing page.{detail}"),
        },
        429 => GripError::ProviderRateLimit {
            provider: provider.to_string(),
            hint: format!("Wait a moment and try again, or upgrade your plan.{detail}"),
        },
        500 | 502 | 503 | 504 | 529 => GripError::ProviderServer {
            provider: provider.to_string(),
            message: format!("HTTP {status}.{detail}"),
        },
        422 => GripError::ProviderOther {
            provider: provider.to_string(),
            message: format!(
                "The provider rejected the request payload. This may be a model compatibility issue.{detail}"
            ),
        },
        other => GripError::ProviderOther {
            provider: provider.to_string(),
            message: format!("Unexpected HTTP {other} from provider.{detail}"),
        },
    }
}

/// Classify a transport-level failure (connect/read timeout vs other
/// connection problem) from a `reqwest::Error`.
pub fn classify_transport_error(err: &reqwest::Error, provider: &str) -> GripError {
    if err.is_timeout() {
        GripError::ProviderTimeout { provider: provider.to_string(), message: err.to_string() }
    } else if err.is_connect() {
        GripError::ProviderConnection { provider: provider.to_string(), message: err.to_string() }
    } else {
        GripError::ProviderOther { provider: provider.to_string(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_statuses() {
        assert!(classify_status(429, "openai", "gpt-4o", "").is_retryable());
        assert!(classify_status(503, "openai", "gpt-4o", "").is_retryable());
        assert!(classify_status(500, "openai", "gpt-4o", "").is_retryable());
        assert!(classify_status(504, "openai", "gpt-4o", "").is_retryable());
    }

    #[test]
    fn classifies_non_retryable_statuses() {
        assert!(!classify_status(401, "openai", "gpt-4o", "").is_retryable());
        assert!(!classify_status(404, "openai", "gpt-4o", "").is_retryable());
        assert!(!classify_status(402, "openai", "gpt-4o", "").is_retryable());
    }
}
