//! MCP management routes: `GET /servers`, `GET /{name}/status`,
//! `POST /{name}/login`, `GET /callback` (public), `POST
//! /{name}/enable`, `POST /{name}/disable`.

use crate::state::GatewayState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use grip_core::config::{save_config, GripConfig};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub async fn list_servers(State(state): State<Arc<GatewayState>>) -> Response {
    let config = state.config();
    let servers: Vec<_> = state
        .mcp
        .status_list(&config)
        .into_iter()
        .map(|(name, status)| json!({ "name": name, "status": status }))
        .collect();
    Json(json!({ "servers": servers })).into_response()
}

pub async fn server_status(State(state): State<Arc<GatewayState>>, Path(name): Path<String>) -> Response {
    let config = state.config();
    if !config.tools.mcp_servers.contains_key(&name) {
        return error(StatusCode::NOT_FOUND, format!("no such MCP server: {name}"));
    }
    let status = state
        .mcp
        .status_list(&config)
        .into_iter()
        .find(|(n, _)| n == &name)
        .map(|(_, status)| status);
    Json(json!({ "name": name, "status": status })).into_response()
}

pub async fn login(State(state): State<Arc<GatewayState>>, Path(name): Path<String>) -> Response {
    let config = state.config();
    let Some(entry) = config.tools.mcp_servers.get(&name) else {
        return error(StatusCode::NOT_FOUND, format!("no such MCP server: {name}"));
    };
    let Some(oauth_cfg) = entry.oauth.clone() else {
        return error(StatusCode::BAD_REQUEST, format!("'{name}' has no OAuth configuration"));
    };

    let auth_url = state.mcp.begin_gateway_login(&name, oauth_cfg, &state.pending_oauth);
    Json(json!({
        "auth_url": auth_url,
        "server_name": name,
        "status": "pending",
    }))
    .into_response()
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

const CALLBACK_SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>grip — login successful</title></head>
<body style="font-family: system-ui, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f8f9fa;">
<div style="text-align: center; padding: 2rem; background: white; border-radius: 12px; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
<h1 style="color: #22c55e; margin-bottom: 0.5rem;">Connected '{server}'</h1>
<p style="color: #64748b;">You can close this tab and return to grip.</p>
</div>
</body>
</html>"#;

const CALLBACK_ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>grip — login failed</title></head>
<body style="font-family: system-ui, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f8f9fa;">
<div style="text-align: center; padding: 2rem; background: white; border-radius: 12px; box-shadow: 0 2px 8px rgba(0,0,0,0.1);">
<h1 style="color: #ef4444; margin-bottom: 0.5rem;">Login failed</h1>
<p style="color: #64748b;">{error}</p>
</div>
</body>
</html>"#;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Public: no bearer auth, matching §6's "public; completes OAuth
/// exchange; renders HTML" contract — the CSRF `state` token is the
/// only credential this route trusts.
pub async fn callback(State(state): State<Arc<GatewayState>>, Query(query): Query<CallbackQuery>) -> Html<String> {
    if let Some(err) = query.error {
        return Html(CALLBACK_ERROR_HTML.replace("{error}", &html_escape(&err)));
    }
    let (Some(csrf_state), Some(code)) = (query.state, query.code) else {
        return Html(CALLBACK_ERROR_HTML.replace("{error}", "Missing state or authorization code."));
    };

    match state.mcp.complete_gateway_login(&csrf_state, &code, &state.pending_oauth).await {
        Ok(server_name) => Html(CALLBACK_SUCCESS_HTML.replace("{server}", &html_escape(&server_name))),
        Err(e) => Html(CALLBACK_ERROR_HTML.replace("{error}", &html_escape(&e))),
    }
}

async fn set_enabled(state: &GatewayState, name: &str, enabled: bool) -> Result<(), Response> {
    let mut config: GripConfig = (*state.config()).clone();
    let Some(entry) = config.tools.mcp_servers.get_mut(name) else {
        return Err(error(StatusCode::NOT_FOUND, format!("no such MCP server: {name}")));
    };
    entry.enabled = enabled;
    let entry = entry.clone();

    save_config(&config, state.config_path.as_deref())
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    *state.config.write() = Arc::new(config);

    if enabled {
        if let Err(e) = state.mcp.reconnect_server(name, entry).await {
            log::warn!("enabled '{name}' but reconnect failed: {e}");
        }
    } else {
        state.mcp.disconnect(name).await;
    }
    Ok(())
}

pub async fn enable(State(state): State<Arc<GatewayState>>, Path(name): Path<String>) -> Response {
    match set_enabled(&state, &name, true).await {
        Ok(()) => Json(json!({ "name": name, "enabled": true })).into_response(),
        Err(resp) => resp,
    }
}

pub async fn disable(State(state): State<Arc<GatewayState>>, Path(name): Path<String>) -> Response {
    match set_enabled(&state, &name, false).await {
        Ok(()) => Json(json!({ "name": name, "enabled": false })).into_response(),
        Err(resp) => resp,
    }
}
