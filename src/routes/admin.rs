//! Operator dashboard routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/applications", get(list_applications))
        .route("/api/admin/applications/:id/notes", post(add_note))
        .route("/api/admin/events", get(list_events))
        .route("/api/admin/notes", get(list_notes))
        .route("/api/admin/stats", get(get_stats))
}
