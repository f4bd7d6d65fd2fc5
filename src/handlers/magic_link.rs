//! Operator magic-link handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::magic_link::MagicLinkService;
use crate::middleware::AdminKey;
use crate::models::{ApiResponse, MagicLink};

#[derive(Debug, Deserialize)]
pub struct IssueLinkRequest {
    pub application_id: Option<String>,
    pub phone: Option<String>,
    pub max_uses: Option<i32>,
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IssueLinkResponse {
    pub magic_link_id: Uuid,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
    pub sms_sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct LinkFilter {
    pub application_id: Option<String>,
}

/// Issue a link and text it to the applicant. SMS failure is reported, not raised.
pub async fn issue_magic_link(
    _admin: AdminKey,
    State(service): State<Arc<MagicLinkService>>,
    Json(request): Json<IssueLinkRequest>,
) -> Result<Json<ApiResponse<IssueLinkResponse>>, ApiError> {
    let (Some(application_id), Some(phone)) = (
        required(&request.application_id),
        required(&request.phone),
    ) else {
        return Err(ApiError::BadRequest(
            "application_id et phone requis".to_string(),
        ));
    };

    let defaults = service.config();
    let link = service
        .issue(
            application_id,
            request.max_uses.unwrap_or(defaults.max_uses),
            request.ttl_hours.unwrap_or(defaults.ttl_hours),
        )
        .await?;

    let sms_sent = service.send_link_sms(&link, phone).await;

    Ok(Json(ApiResponse::ok(IssueLinkResponse {
        magic_link_id: link.id,
        url: link.url,
        expires_at: link.expires_at,
        max_uses: link.max_uses,
        sms_sent,
    })))
}

pub async fn list_magic_links(
    _admin: AdminKey,
    State(service): State<Arc<MagicLinkService>>,
    Query(filter): Query<LinkFilter>,
) -> Result<Json<ApiResponse<Vec<MagicLink>>>, ApiError> {
    let links = service
        .list_links(filter.application_id.as_deref().filter(|id| !id.is_empty()))
        .await?;

    Ok(Json(ApiResponse::ok(links)))
}

pub async fn revoke_magic_link(
    _admin: AdminKey,
    State(service): State<Arc<MagicLinkService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MagicLink>>, ApiError> {
    let link = service.revoke(id).await?;
    Ok(Json(ApiResponse::ok(link)))
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
