//! Token accounting, OAuth token storage, the OAuth 2.0 + PKCE login
//! flow for MCP servers, and per-directory filesystem trust.

pub mod oauth;
pub mod token_store;
pub mod token_tracker;
pub mod trust;

pub use oauth::{OAuthFlow, OAuthFlowError, PendingOAuthStates};
pub use token_store::{StoredToken, TokenStore};
pub use token_tracker::TokenTracker;
pub use trust::{TrustManager, TrustPrompt};
