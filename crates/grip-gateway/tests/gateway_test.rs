//! End-to-end tests: bind a real listener, serve the gateway router
//! against it, and drive it with `reqwest` the way an external caller
//! would.

use grip_core::config::GripConfig;
use grip_core::mcp::McpManager;
use grip_core::security::{PendingOAuthStates, TokenStore};
use grip_core::tools::ToolRegistry;
use grip_gateway::{routes, GatewayState, RateLimiter};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;

const AUTH_TOKEN: &str = "test-token-123";

async fn spawn_gateway() -> (String, tokio::task::JoinHandle<()>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GripConfig::default();
    config.gateway.api.auth_token = AUTH_TOKEN.into();
    config.tools.mcp_servers.insert(
        "needs-auth".to_string(),
        grip_core::config::schema::McpServerConfig {
            enabled: true,
            oauth: Some(grip_core::config::schema::OAuthConfig {
                client_id: "abc".to_string(),
                auth_url: "https://example.com/authorize".to_string(),
                token_url: "https://example.com/token".to_string(),
                scopes: vec![],
                redirect_port: 0,
            }),
            ..Default::default()
        },
    );

    let registry = Arc::new(ToolRegistry::new());
    let token_store = Arc::new(TokenStore::new(dir.path().join("mcp_tokens.json")));
    let mcp = Arc::new(McpManager::new(registry, token_store));

    let state = Arc::new(GatewayState {
        config: RwLock::new(Arc::new(config)),
        config_path: Some(dir.path().join("config.json")),
        mcp,
        pending_oauth: Arc::new(PendingOAuthStates::new()),
        rate_limiter: RateLimiter::new(0, 0),
    });

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    });
    (format!("http://{addr}"), handle, dir)
}

#[tokio::test]
async fn healthz_requires_no_auth() {
    let (base, _server, _dir) = spawn_gateway().await;
    let resp = reqwest::get(format!("{base}/healthz")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn mcp_servers_rejects_missing_bearer_token() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/api/v1/mcp/servers")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn mcp_servers_rejects_wrong_bearer_token() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/api/v1/mcp/servers"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn mcp_servers_lists_configured_server_status() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base}/api/v1/mcp/servers"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let servers = body["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["name"], "needs-auth");
    assert_eq!(servers[0]["status"], "authrequired");
}

#[tokio::test]
async fn login_returns_auth_url_for_oauth_server() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/v1/mcp/needs-auth/login"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["auth_url"].as_str().unwrap().starts_with("https://example.com/authorize?"));
    assert_eq!(body["server_name"], "needs-auth");
}

#[tokio::test]
async fn login_404s_for_unknown_server() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/v1/mcp/ghost/login"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn callback_renders_error_html_for_unknown_state() {
    let (base, _server, _dir) = spawn_gateway().await;
    let resp = reqwest::get(format!("{base}/api/v1/mcp/callback?state=nope&code=abc")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Login failed"));
}

#[tokio::test]
async fn disable_then_enable_round_trips_status() {
    let (base, _server, _dir) = spawn_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/mcp/needs-auth/disable"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/api/v1/mcp/needs-auth/status"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "disabled");

    // Re-enabling an OAuth server with no stored token surfaces
    // `authrequired` again rather than `connected`.
    let resp = client
        .post(format!("{base}/api/v1/mcp/needs-auth/enable"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/api/v1/mcp/needs-auth/status"))
        .bearer_auth(AUTH_TOKEN)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "authrequired");
}
