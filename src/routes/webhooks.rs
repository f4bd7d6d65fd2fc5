//! Inbound webhooks and scheduler callbacks

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/api/webhook/margill", post(margill_webhook))
        .route("/api/webhooks/vopay", post(vopay_webhook))
}

pub fn cron_routes() -> Router<AppState> {
    Router::new().route("/api/cron/cleanup", get(cleanup_magic_links))
}
