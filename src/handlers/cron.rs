//! Scheduler-triggered maintenance

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::magic_link::{CleanupReport, MagicLinkService};
use crate::middleware::CronAuth;
use crate::models::ApiResponse;

pub async fn cleanup_magic_links(
    _cron: CronAuth,
    State(service): State<Arc<MagicLinkService>>,
) -> Result<Json<ApiResponse<CleanupReport>>, ApiError> {
    let report = service.cleanup().await?;
    Ok(Json(ApiResponse::ok(report)))
}
