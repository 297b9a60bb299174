//! The bearer-authenticated HTTP surface for MCP server management
//! and OAuth callbacks: list/inspect/enable/disable MCP servers and
//! complete gateway-mediated OAuth logins, plus a liveness probe.

pub mod auth;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use rate_limit::RateLimiter;
pub use state::GatewayState;
