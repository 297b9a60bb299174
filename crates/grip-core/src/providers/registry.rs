//! Metadata for known providers and the factory function that turns a
//! configured model string into a concrete `LLMProvider`.

use super::anthropic::AnthropicProvider;
use super::google::GoogleProvider;
use super::openai::OpenAiCompatProvider;
use super::types::LLMProvider;
use crate::config::schema::{GripConfig, ProviderEntry};
use log::{info, warn};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub api_base: &'static str,
    pub api_key_env: &'static str,
    pub default_models: &'static [&'static str],
    pub model_prefix: &'static str,
}

pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        api_base: "https://openrouter.ai/api/v1",
        api_key_env: "OPENROUTER_API_KEY",
        default_models: &["anthropic/claude-sonnet-4.6", "openai/gpt-5.2", "x-ai/grok-4.1-fast"],
        model_prefix: "openrouter/",
    },
    ProviderSpec {
        name: "anthropic",
        display_name: "Anthropic",
        api_base: "https://api.anthropic.com/v1",
        api_key_env: "ANTHROPIC_API_KEY",
        default_models: &["claude-sonnet-4-20250514", "claude-haiku-4-5-20251001"],
        model_prefix: "anthropic/",
    },
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        api_base: "https://api.openai.com/v1",
        api_key_env: "OPENAI_API_KEY",
        default_models: &["gpt-4o", "gpt-4o-mini", "o1"],
        model_prefix: "openai/",
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        api_base: "https://api.deepseek.com/v1",
        api_key_env: "DEEPSEEK_API_KEY",
        default_models: &["deepseek-chat", "deepseek-reasoner"],
        model_prefix: "deepseek/",
    },
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        api_base: "https://api.groq.com/openai/v1",
        api_key_env: "GROQ_API_KEY",
        default_models: &["llama-3.3-70b-versatile", "mixtral-8x7b-32768"],
        model_prefix: "groq/",
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Google Gemini",
        api_base: "https://generativelanguage.googleapis.com/v1beta/openai",
        api_key_env: "GEMINI_API_KEY",
        default_models: &["gemini-2.5-pro", "gemini-2.5-flash"],
        model_prefix: "gemini/",
    },
    ProviderSpec {
        name: "qwen",
        display_name: "Qwen (DashScope)",
        api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        api_key_env: "DASHSCOPE_API_KEY",
        default_models: &["qwen-max", "qwen-turbo"],
        model_prefix: "qwen/",
    },
    ProviderSpec {
        name: "minimax",
        display_name: "MiniMax",
        api_base: "https://api.minimax.chat/v1",
        api_key_env: "MINIMAX_API_KEY",
        default_models: &["abab6.5s-chat"],
        model_prefix: "minimax/",
    },
    ProviderSpec {
        name: "moonshot",
        display_name: "Moonshot / Kimi",
        api_base: "https://api.moonshot.cn/v1",
        api_key_env: "MOONSHOT_API_KEY",
        default_models: &["moonshot-v1-128k"],
        model_prefix: "moonshot/",
    },
    ProviderSpec {
        name: "ollama_cloud",
        display_name: "Ollama (Cloud)",
        api_base: "https://ollama.com/v1",
        api_key_env: "OLLAMA_API_KEY",
        default_models: &["llama3.3", "qwen2.5", "deepseek-r1"],
        model_prefix: "ollama_cloud/",
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama (Local)",
        api_base: "http://localhost:11434/v1",
        api_key_env: "",
        default_models: &["llama3.2", "qwen2.5", "mistral"],
        model_prefix: "",
    },
    ProviderSpec {
        name: "llamacpp",
        display_name: "Llama.cpp (Local)",
        api_base: "http://localhost:8080/v1",
        api_key_env: "",
        default_models: &[],
        model_prefix: "",
    },
    ProviderSpec {
        name: "lmstudio",
        display_name: "LM Studio (Local)",
        api_base: "http://localhost:1234/v1",
        api_key_env: "",
        default_models: &["llama-3.2-3b-instruct", "qwen2.5-7b-instruct"],
        model_prefix: "",
    },
    ProviderSpec {
        name: "vllm",
        display_name: "vLLM (Local)",
        api_base: "http://localhost:8000/v1",
        api_key_env: "",
        default_models: &[],
        model_prefix: "vllm/",
    },
    ProviderSpec {
        name: "zhipu",
        display_name: "Zhipu AI",
        api_base: "https://open.bigmodel.cn/api/paas/v4",
        api_key_env: "ZHIPU_API_KEY",
        default_models: &["glm-4", "glm-4-flash"],
        model_prefix: "zhipu/",
    },
];

fn by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.name == name)
}

fn by_prefix(model_string: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS
        .iter()
        .filter(|s| !s.model_prefix.is_empty())
        .find(|s| model_string.starts_with(s.model_prefix))
}

pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn get_spec(name: &str) -> Option<&'static ProviderSpec> {
        by_name(name)
    }

    pub fn list_providers() -> &'static [ProviderSpec] {
        PROVIDERS
    }

    /// Parse `"provider/model"` into `(ProviderSpec, bare_model_name)`.
    ///
    /// When `provider` is non-empty it takes priority over prefix
    /// detection — this lets `openai/gpt-oss-120b` route through
    /// OpenRouter when `provider = "openrouter"`. Falls back to
    /// OpenRouter when nothing else matches.
    pub fn resolve_model(model_string: &str, provider: &str) -> Result<(&'static ProviderSpec, String), String> {
        if !provider.is_empty() {
            if let Some(spec) = by_name(provider) {
                let bare = if !spec.model_prefix.is_empty() && model_string.starts_with(spec.model_prefix) {
                    model_string[spec.model_prefix.len()..].to_string()
                } else {
                    model_string.to_string()
                };
                return Ok((spec, bare));
            }
            warn!("Explicit provider '{provider}' not found in registry, falling back to prefix detection");
        }

        if let Some(spec) = by_prefix(model_string) {
            return Ok((spec, model_string[spec.model_prefix.len()..].to_string()));
        }

        for spec in PROVIDERS {
            if let Some(bare) = model_string.strip_prefix(&format!("{}/", spec.name)) {
                return Ok((spec, bare.to_string()));
            }
        }

        by_name("openrouter")
            .map(|spec| (spec, model_string.to_string()))
            .ok_or_else(|| format!("Cannot resolve provider for model: {model_string}"))
    }
}

fn resolve_api_key(spec: &ProviderSpec, providers: &HashMap<String, ProviderEntry>) -> String {
    if let Some(entry) = providers.get(spec.name) {
        if !entry.api_key.is_empty() {
            return entry.api_key.expose().to_string();
        }
    }
    if spec.api_key_env.is_empty() {
        return String::new();
    }
    std::env::var(spec.api_key_env).unwrap_or_default()
}

fn resolve_api_base(spec: &ProviderSpec, providers: &HashMap<String, ProviderEntry>) -> String {
    providers
        .get(spec.name)
        .map(|e| e.api_base.clone())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| spec.api_base.to_string())
}

const LOCAL_PROVIDERS: &[&str] = &["ollama", "ollama_cloud", "llamacpp", "lmstudio", "vllm"];

/// Instantiate the correct `LLMProvider` for the configured default
/// model, using the explicit `provider` field (if set) or the model
/// string's prefix to pick a provider spec.
pub fn create_provider(config: &GripConfig) -> Result<Box<dyn LLMProvider>, String> {
    let model_string = &config.agents.defaults.model;
    let explicit_provider = &config.agents.defaults.provider;
    let (spec, bare_model) = ProviderRegistry::resolve_model(model_string, explicit_provider)?;

    let api_key = resolve_api_key(spec, &config.providers);
    let api_base = resolve_api_base(spec, &config.providers);

    info!("Creating provider: {} (model={bare_model}, base={api_base})", spec.display_name);

    let provider: Box<dyn LLMProvider> = match spec.name {
        "anthropic" => Box::new(AnthropicProvider::new(spec.display_name, &api_base, &api_key, &bare_model)),
        "gemini" => Box::new(GoogleProvider::new(spec.display_name, &api_base, &api_key, &bare_model)),
        _ if LOCAL_PROVIDERS.contains(&spec.name) || api_key.is_empty() => Box::new(
            OpenAiCompatProvider::new(spec.display_name, &api_base, if api_key.is_empty() { "not-needed" } else { &api_key }, &bare_model),
        ),
        _ => Box::new(OpenAiCompatProvider::new(spec.display_name, &api_base, &api_key, &bare_model)),
    };

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_explicit_prefix() {
        let (spec, model) = ProviderRegistry::resolve_model("anthropic/claude-sonnet-4", "").unwrap();
        assert_eq!(spec.name, "anthropic");
        assert_eq!(model, "claude-sonnet-4");
    }

    #[test]
    fn explicit_provider_overrides_prefix_detection() {
        let (spec, model) = ProviderRegistry::resolve_model("openai/gpt-oss-120b", "openrouter").unwrap();
        assert_eq!(spec.name, "openrouter");
        assert_eq!(model, "openai/gpt-oss-120b");
    }

    #[test]
    fn unknown_prefix_falls_back_to_openrouter() {
        let (spec, model) = ProviderRegistry::resolve_model("gpt-4o", "").unwrap();
        assert_eq!(spec.name, "openrouter");
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn ollama_prefix_strips_local_prefix() {
        let (spec, model) = ProviderRegistry::resolve_model("ollama/llama3.2", "").unwrap();
        assert_eq!(spec.name, "ollama");
        assert_eq!(model, "llama3.2");
    }
}
