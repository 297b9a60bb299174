//! Bearer-token auth and rate limiting, applied to every route except
//! `/healthz` and the public OAuth callback.

use crate::state::GatewayState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub async fn require_bearer_token(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let config = state.config();
    let expected = config.gateway.api.auth_token.expose();
    if expected.is_empty() {
        log::error!("gateway.api.auth_token is not configured; rejecting all requests");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "gateway auth token not configured");
    }

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));

    if provided != Some(expected) {
        return error_response(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }

    if !state.rate_limiter.check(&addr.ip().to_string()) {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }

    next.run(req).await
}
