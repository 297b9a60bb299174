pub mod mcp;

use crate::auth::require_bearer_token;
use crate::state::GatewayState;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any);
    if origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

pub fn build(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.config().gateway.api.cors_allowed_origins);

    let authed = Router::new()
        .route("/api/v1/mcp/servers", get(mcp::list_servers))
        .route("/api/v1/mcp/:name/status", get(mcp::server_status))
        .route("/api/v1/mcp/:name/login", post(mcp::login))
        .route("/api/v1/mcp/:name/enable", post(mcp::enable))
        .route("/api/v1/mcp/:name/disable", post(mcp::disable))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/mcp/callback", get(mcp::callback))
        .merge(authed)
        .layer(cors)
        .with_state(state)
}
