//! `grip-gateway` binary entry point: loads configuration, connects
//! configured MCP servers, and serves the gateway's routes.

use grip_core::config::load_config;
use grip_core::mcp::McpManager;
use grip_core::security::{PendingOAuthStates, TokenStore};
use grip_core::tools::ToolRegistry;
use grip_gateway::{routes, GatewayState, RateLimiter};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

fn grip_home() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".grip")
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var("GRIP_CONFIG").ok().map(PathBuf::from);
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("grip-gateway: failed to load config: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    if config.gateway.api.auth_token.is_empty() {
        log::warn!(
            "gateway.api.auth_token is empty; every authenticated request will be rejected until it is set"
        );
    }

    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let rate_limiter =
        RateLimiter::new(config.gateway.api.rate_limit_per_minute, config.gateway.api.rate_limit_per_minute_per_ip);

    let registry = Arc::new(ToolRegistry::new());
    let token_store = Arc::new(TokenStore::new(grip_home().join("mcp_tokens.json")));
    let mcp = Arc::new(McpManager::new(registry, token_store));
    let connected = mcp.connect_all(&config).await;
    log::info!("Connected to {connected} MCP server(s)");

    let state = Arc::new(GatewayState {
        config: RwLock::new(Arc::new(config)),
        config_path,
        mcp,
        pending_oauth: Arc::new(PendingOAuthStates::new()),
        rate_limiter,
    });

    let app = routes::build(state);
    let addr = format!("{host}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("grip-gateway: failed to bind {addr}: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    log::info!("grip-gateway listening on http://{addr}");
    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    if let Err(e) = result {
        eprintln!("grip-gateway: server error: {e}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
