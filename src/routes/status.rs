//! Public status route

use axum::{
    http::{header, HeaderValue},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::handlers::*;
use crate::middleware::{rate_limit, RateLimiter};
use crate::state::AppState;

/// Rate limited per client IP; responses are never cached
pub fn status_routes(rate_limiter: RateLimiter) -> Router<AppState> {
    Router::new()
        .route("/api/status", get(get_client_status))
        .route_layer(from_fn_with_state(rate_limiter, rate_limit))
        .route_layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
