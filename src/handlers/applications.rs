//! Margill webhook, operator notes and dashboard listings

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::applications::{ApplicationService, DashboardStats, MargillSyncResult, NewNoteRequest};
use crate::error::ApiError;
use crate::middleware::AdminKey;
use crate::models::{ApiResponse, Application, ApplicationEvent, ClientNote};

const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

pub async fn margill_webhook(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<MargillSyncResult>>, ApiError> {
    let result = service.sync_from_margill(payload).await?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn add_note(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
    Path(application_id): Path<String>,
    Json(request): Json<NewNoteRequest>,
) -> Result<Json<ApiResponse<ClientNote>>, ApiError> {
    let note = service.add_note(&application_id, request).await?;
    Ok(Json(ApiResponse::ok(note)))
}

pub async fn list_applications(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Application>>>, ApiError> {
    let applications = service.list_applications(query.limit()).await?;
    Ok(Json(ApiResponse::ok(applications)))
}

pub async fn list_events(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ApplicationEvent>>>, ApiError> {
    let events = service.list_events(query.limit()).await?;
    Ok(Json(ApiResponse::ok(events)))
}

pub async fn list_notes(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ClientNote>>>, ApiError> {
    let notes = service.list_notes(query.limit()).await?;
    Ok(Json(ApiResponse::ok(notes)))
}

pub async fn get_stats(
    _admin: AdminKey,
    State(service): State<Arc<ApplicationService>>,
) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    let stats = service.stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}
