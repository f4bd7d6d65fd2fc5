//! Payment provider webhook

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::payments::{PaymentReceipt, PaymentService};

/// Authenticated by the HMAC carried in the body
pub async fn vopay_webhook(
    State(service): State<Arc<PaymentService>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<PaymentReceipt>>, ApiError> {
    let receipt = service.process_webhook(payload).await?;
    Ok(Json(ApiResponse::ok(receipt)))
}
