//! Route definitions for the progression API

mod admin;
mod magic_link;
mod status;
mod webhooks;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::handlers::health_check;
use crate::middleware;
use crate::state::AppState;

pub use admin::admin_routes;
pub use magic_link::magic_link_routes;
pub use status::status_routes;
pub use webhooks::{cron_routes, webhook_routes};

/// Full application router with middleware applied
pub fn app_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .merge(magic_link_routes())
        .merge(status_routes(state.rate_limiter.clone()))
        .merge(admin_routes())
        .merge(webhook_routes())
        .merge(cron_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers));

    let router = if config.environment.is_production() {
        router.layer(axum::middleware::from_fn(middleware::hsts_header))
    } else {
        router
    };

    router
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(config.cors_allowed_origins.as_deref()))
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let Some(allowed_origins) = allowed_origins.filter(|s| !s.trim().is_empty()) else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::auth::API_KEY_HEADER),
        ])
        .expose_headers(Any)
}
