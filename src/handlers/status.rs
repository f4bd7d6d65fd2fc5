//! Public client status handler

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::magic_link::MagicLinkService;
use crate::models::ApiResponse;
use crate::progress::{ClientStatus, StatusService};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub t: Option<String>,
}

/// Redeem a magic link token and return the application's progress.
///
/// Each successful call consumes one use of the link.
pub async fn get_client_status(
    State(links): State<Arc<MagicLinkService>>,
    State(status): State<Arc<StatusService>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<ClientStatus>>, ApiError> {
    let token = query
        .t
        .ok_or_else(|| ApiError::BadRequest("Token requis".to_string()))?;

    let application_id = links.validate(&token).await?;
    let client_status = status.compose(&application_id).await?;

    Ok(Json(ApiResponse::ok(client_status)))
}
