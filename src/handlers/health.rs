//! Health check

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::store::Stores;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub version: String,
}

pub async fn health_check(State(stores): State<Stores>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store) = match stores.applications.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", stores.backend.to_string()),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unhealthy",
                format!("{}: unreachable", stores.backend),
            )
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            store,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
