//! OAuth 2.0 Authorization Code flow with PKCE for MCP servers.
//!
//! Spins up a temporary localhost HTTP listener, opens the user's
//! browser to the authorization URL, waits for the redirect carrying
//! the authorization code, and exchanges it for tokens.

use crate::config::schema::OAuthConfig;
use crate::security::token_store::StoredToken;
use base64::Engine as _;
use rand::Rng;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub type OAuthFlowError = String;

const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Login Successful</title></head>
<body style="font-family: system-ui, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f8f9fa;">
<div style="text-align: center; padding: 2rem; background: white; border-radius: 12px; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
<h1 style="color: #22c55e; margin-bottom: 0.5rem;">Login Successful!</h1>
<p style="color: #64748b;">You can close this tab and return to grip.</p>
</div>
</body>
</html>"#;

const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Login Failed</title></head>
<body style="font-family: system-ui, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f8f9fa;">
<div style="text-align: center; padding: 2rem; background: white; border-radius: 12px; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
<h1 style="color: #ef4444; margin-bottom: 0.5rem;">Login Failed</h1>
<p style="color: #64748b;">{error}</p>
</div>
</body>
</html>"#;

fn random_urlsafe(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::rng().fill(&mut bytes[..]);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Executes a browser-based OAuth 2.0 authorization code flow with PKCE.
pub struct OAuthFlow {
    config: OAuthConfig,
    server_name: String,
    timeout: Duration,
    code_verifier: String,
    state: String,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig, server_name: impl Into<String>) -> Self {
        Self {
            config,
            server_name: server_name.into(),
            timeout: Duration::from_secs(120),
            code_verifier: random_urlsafe(64),
            state: random_urlsafe(32),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn code_challenge(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.code_verifier.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.config.redirect_port)
    }

    /// The random CSRF token this flow expects back on its callback.
    /// Used by gateway-mediated logins to key the pending-state map.
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Exchange an authorization code for tokens without running the
    /// local listener — used when a host (the HTTP gateway) owns the
    /// callback route itself instead of `execute`'s embedded one.
    pub async fn exchange(&self, code: &str) -> Result<StoredToken, OAuthFlowError> {
        self.exchange_code(code).await
    }

    /// Build the full authorization URL with PKCE and state parameters.
    pub fn build_auth_url(&self) -> String {
        let mut params = vec![
            ("client_id".to_string(), self.config.client_id.clone()),
            ("response_type".to_string(), "code".to_string()),
            ("redirect_uri".to_string(), self.redirect_uri()),
            ("state".to_string(), self.state.clone()),
            ("code_challenge".to_string(), self.code_challenge()),
            ("code_challenge_method".to_string(), "S256".to_string()),
        ];
        if !self.config.scopes.is_empty() {
            params.push(("scope".to_string(), self.config.scopes.join(" ")));
        }
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.config.auth_url)
    }

    /// Run the full flow: open the browser, wait for the callback,
    /// exchange the code for tokens.
    pub async fn execute(&self) -> Result<StoredToken, OAuthFlowError> {
        let listener = TcpListener::bind(("127.0.0.1", self.config.redirect_port))
            .await
            .map_err(|e| format!("Failed to bind OAuth callback listener: {e}"))?;

        let auth_url = self.build_auth_url();
        log::info!("Opening browser for '{}' OAuth login", self.server_name);
        if let Err(e) = open::that(&auth_url) {
            log::warn!("Failed to open browser automatically: {e}. Visit manually: {auth_url}");
        }

        let code = tokio::time::timeout(self.timeout, self.wait_for_callback(listener))
            .await
            .map_err(|_| {
                format!(
                    "OAuth login timed out after {}s for '{}'",
                    self.timeout.as_secs(),
                    self.server_name
                )
            })??;

        self.exchange_code(&code).await
    }

    /// Use a refresh token to obtain a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, OAuthFlowError> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| format!("Token refresh request failed for '{}': {e}", self.server_name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "Token refresh failed for '{}': {status} {}",
                self.server_name,
                &body[..body.len().min(200)]
            ));
        }
        let json: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        Ok(Self::parse_token_response(&json))
    }

    async fn wait_for_callback(&self, listener: TcpListener) -> Result<String, OAuthFlowError> {
        let (mut stream, _addr) =
            listener.accept().await.map_err(|e| format!("Accept failed: {e}"))?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await.map_err(|e| format!("Read failed: {e}"))?;
        let request = String::from_utf8_lossy(&buf[..n]).to_string();

        let path = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("")
            .to_string();
        let params = parse_query(&path);

        if let Some(error) = params.get("error") {
            let html = ERROR_HTML.replace("{error}", &html_escape(error));
            Self::send_response(&mut stream, 400, &html).await;
            return Err(format!("OAuth provider returned error: {error}"));
        }

        let state = params.get("state").map(String::as_str).unwrap_or("");
        if state != self.state {
            let html = ERROR_HTML.replace("{error}", "State mismatch - possible CSRF attack.");
            Self::send_response(&mut stream, 400, &html).await;
            return Err("OAuth state mismatch".to_string());
        }

        let Some(code) = params.get("code") else {
            let html = ERROR_HTML.replace("{error}", "No authorization code received.");
            Self::send_response(&mut stream, 400, &html).await;
            return Err("No authorization code in callback".to_string());
        };

        Self::send_response(&mut stream, 200, SUCCESS_HTML).await;
        Ok(code.clone())
    }

    async fn send_response(stream: &mut tokio::net::TcpStream, status: u16, html: &str) {
        let status_text = if status == 200 { "OK" } else { "Bad Request" };
        let response = format!(
            "HTTP/1.1 {status} {status_text}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{html}",
            html.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
    }

    async fn exchange_code(&self, auth_code: &str) -> Result<StoredToken, OAuthFlowError> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", auth_code),
                ("redirect_uri", self.redirect_uri().as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", self.code_verifier.as_str()),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| format!("Token exchange request failed for '{}': {e}", self.server_name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!(
                "Token exchange failed for '{}': {status} {}",
                self.server_name,
                &body[..body.len().min(200)]
            ));
        }
        let json: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        Ok(Self::parse_token_response(&json))
    }

    fn parse_token_response(data: &serde_json::Value) -> StoredToken {
        let expires_in = data.get("expires_in").and_then(|v| v.as_u64()).unwrap_or(0);
        let expires_at = if expires_in > 0 {
            chrono::Utc::now().timestamp_millis() as f64 / 1000.0 + expires_in as f64
        } else {
            0.0
        };
        StoredToken {
            access_token: data.get("access_token").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            refresh_token: data.get("refresh_token").and_then(|v| v.as_str()).unwrap_or("").to_string(),
            expires_at,
            token_type: data.get("token_type").and_then(|v| v.as_str()).unwrap_or("Bearer").to_string(),
            scopes: data
                .get("scope")
                .and_then(|v| v.as_str())
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

fn parse_query(path: &str) -> std::collections::HashMap<String, String> {
    let Some(query) = path.split_once('?').map(|(_, q)| q) else { return Default::default() };
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// RFC 7591 dynamic client registration, used when an MCP server
/// advertises an OAuth protected-resource metadata document but no
/// static `client_id` has been configured.
pub async fn register_dynamic_client(
    registration_endpoint: &str,
    redirect_uri: &str,
    client_name: &str,
) -> Result<String, OAuthFlowError> {
    let client = reqwest::Client::new();
    let response = client
        .post(registration_endpoint)
        .json(&serde_json::json!({
            "client_name": client_name,
            "redirect_uris": [redirect_uri],
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none",
        }))
        .timeout(Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| format!("Dynamic client registration failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Dynamic client registration rejected: {}", response.status()));
    }
    let json: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
    json.get("client_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| "Registration response missing 'client_id'".to_string())
}

/// Process-local map of in-flight gateway-mediated OAuth logins,
/// keyed by the flow's `state`. Used by `POST /mcp/{name}/login` to
/// stash the flow and by the public `GET /mcp/callback` route to
/// retrieve and complete it. Entries expire after 10 minutes and the
/// map is capped at 100 concurrent logins, per §4.10.
pub struct PendingOAuthStates {
    entries: parking_lot::Mutex<std::collections::HashMap<String, (OAuthFlow, std::time::Instant)>>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for PendingOAuthStates {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOAuthStates {
    pub fn new() -> Self {
        Self {
            entries: parking_lot::Mutex::new(std::collections::HashMap::new()),
            ttl: Duration::from_secs(600),
            max_entries: 100,
        }
    }

    fn prune(&self, entries: &mut std::collections::HashMap<String, (OAuthFlow, std::time::Instant)>) {
        let ttl = self.ttl;
        entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
    }

    /// Stash a flow that has had its auth URL handed to the caller,
    /// awaiting the callback. Evicts the oldest entry if at capacity.
    pub fn insert(&self, flow: OAuthFlow) {
        let mut entries = self.entries.lock();
        self.prune(&mut entries);
        if entries.len() >= self.max_entries {
            if let Some(oldest_key) =
                entries.iter().min_by_key(|(_, (_, t))| *t).map(|(k, _)| k.clone())
            {
                entries.remove(&oldest_key);
            }
        }
        entries.insert(flow.state().to_string(), (flow, std::time::Instant::now()));
    }

    /// Remove and return the flow matching `state`, or `None` if it
    /// never existed, already completed, or expired.
    pub fn take(&self, state: &str) -> Option<OAuthFlow> {
        let mut entries = self.entries.lock();
        self.prune(&mut entries);
        entries.remove(state).map(|(flow, _)| flow)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "abc123".to_string(),
            auth_url: "https://example.com/authorize".to_string(),
            token_url: "https://example.com/token".to_string(),
            scopes: vec!["read".to_string(), "write".to_string()],
            redirect_port: 18923,
        }
    }

    #[test]
    fn build_auth_url_includes_pkce_and_state() {
        let flow = OAuthFlow::new(config(), "todoist");
        let url = flow.build_auth_url();
        assert!(url.starts_with("https://example.com/authorize?"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("client_id=abc123"));
        assert!(url.contains("scope=read%20write") || url.contains("scope=read+write"));
    }

    #[test]
    fn redirect_uri_uses_configured_port() {
        let flow = OAuthFlow::new(config(), "todoist");
        assert_eq!(flow.redirect_uri(), "http://localhost:18923/callback");
    }

    #[test]
    fn parse_query_decodes_params() {
        let params = parse_query("/callback?code=abc&state=xyz%3D");
        assert_eq!(params.get("code"), Some(&"abc".to_string()));
        assert_eq!(params.get("state"), Some(&"xyz=".to_string()));
    }

    #[test]
    fn parse_token_response_computes_expiry() {
        let data = serde_json::json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "read write",
        });
        let token = OAuthFlow::parse_token_response(&data);
        assert_eq!(token.access_token, "at");
        assert_eq!(token.scopes, vec!["read".to_string(), "write".to_string()]);
        assert!(token.expires_at > chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
    }

    #[test]
    fn pending_states_round_trip_by_state() {
        let pending = PendingOAuthStates::new();
        let flow = OAuthFlow::new(config(), "todoist");
        let state = flow.state().to_string();
        pending.insert(flow);
        assert_eq!(pending.len(), 1);

        let taken = pending.take(&state).unwrap();
        assert_eq!(taken.server_name(), "todoist");
        assert!(pending.is_empty());
    }

    #[test]
    fn pending_states_unknown_state_returns_none() {
        let pending = PendingOAuthStates::new();
        assert!(pending.take("does-not-exist").is_none());
    }
}
