//! Adapters from grip's internal chat format to concrete LLM
//! services, plus the registry that resolves a configured model
//! string to the right adapter and error classification shared by
//! all of them.

pub mod anthropic;
pub mod classify;
pub mod google;
pub mod openai;
pub mod registry;
pub mod types;

pub use registry::{create_provider, ProviderRegistry, ProviderSpec, PROVIDERS};
pub use types::{ChatParams, LLMProvider};
