//! Operator magic-link routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn magic_link_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/magic-link", post(issue_magic_link))
        .route("/api/admin/magic-links", get(list_magic_links))
        .route("/api/admin/magic-links/:id/revoke", post(revoke_magic_link))
}
