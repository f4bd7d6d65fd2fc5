//! Application service: Margill sync, operator notes and dashboard data

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::margill::{MargillStatusUpdate, MargillSyncResult, MARGILL_EVENT_TYPE};
use crate::error::ApiError;
use crate::models::{Application, ApplicationEvent, ClientNote};
use crate::store::{ApplicationStore, MagicLinkStore, NoteStore, Stores};

const MAX_LIST_LIMIT: i64 = 500;

/// Operator note request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewNoteRequest {
    #[validate(length(min = 1, max = 2000, message = "message doit contenir 1 à 2000 caractères"))]
    pub message: String,
    #[serde(default = "default_visible")]
    pub visible_to_client: bool,
}

fn default_visible() -> bool {
    true
}

/// Dashboard totals
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_applications: i64,
    pub applications_by_status: BTreeMap<String, i64>,
    pub applications_by_origin: BTreeMap<String, i64>,
    pub total_magic_links: i64,
    pub active_magic_links: i64,
}

pub struct ApplicationService {
    applications: Arc<dyn ApplicationStore>,
    notes: Arc<dyn NoteStore>,
    links: Arc<dyn MagicLinkStore>,
}

impl ApplicationService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            applications: stores.applications.clone(),
            notes: stores.notes.clone(),
            links: stores.links.clone(),
        }
    }

    /// Apply a Margill status update.
    ///
    /// The audit event is best effort: a failed insert is logged and the sync
    /// still succeeds.
    pub async fn sync_from_margill(
        &self,
        raw: serde_json::Value,
    ) -> Result<MargillSyncResult, ApiError> {
        let update: MargillStatusUpdate = serde_json::from_value(raw.clone())?;
        let (upsert, margill_status) = update.to_upsert()?;
        let mapped_status = upsert.status;

        let application = self.applications.upsert_application(upsert).await?;

        tracing::info!(
            application_id = %application.id,
            margill_status = %margill_status,
            status = mapped_status.as_str(),
            "Application synced from Margill"
        );

        let payload = serde_json::json!({
            "margill_status": margill_status,
            "mapped_status": mapped_status,
            "raw_data": raw,
        });
        if let Err(e) = self
            .applications
            .insert_event(&application.id, MARGILL_EVENT_TYPE, payload)
            .await
        {
            tracing::error!(
                application_id = %application.id,
                error = %e,
                "Failed to record Margill event"
            );
        }

        Ok(MargillSyncResult {
            application_id: application.id,
            margill_status,
            mapped_status,
            message: "Dossier synchronisé avec succès".to_string(),
        })
    }

    pub async fn add_note(
        &self,
        application_id: &str,
        request: NewNoteRequest,
    ) -> Result<ClientNote, ApiError> {
        request.validate()?;
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("message requis".to_string()));
        }

        if self.applications.get_application(application_id).await?.is_none() {
            return Err(ApiError::NotFound("Dossier introuvable".to_string()));
        }

        let note = self
            .notes
            .insert_note(application_id, message, request.visible_to_client)
            .await?;

        tracing::info!(
            application_id = %application_id,
            note_id = %note.id,
            visible_to_client = note.visible_to_client,
            "Note added"
        );

        Ok(note)
    }

    pub async fn list_applications(&self, limit: i64) -> Result<Vec<Application>, ApiError> {
        Ok(self.applications.list_applications(clamp(limit)).await?)
    }

    pub async fn list_events(&self, limit: i64) -> Result<Vec<ApplicationEvent>, ApiError> {
        Ok(self.applications.list_events(clamp(limit)).await?)
    }

    pub async fn list_notes(&self, limit: i64) -> Result<Vec<ClientNote>, ApiError> {
        Ok(self.notes.list_notes(clamp(limit)).await?)
    }

    pub async fn stats(&self) -> Result<DashboardStats, ApiError> {
        let applications = self.applications.count_applications().await?;
        let links = self.links.count_links(Utc::now()).await?;

        Ok(DashboardStats {
            total_applications: applications.total,
            applications_by_status: applications.by_status,
            applications_by_origin: applications.by_origin,
            total_magic_links: links.total,
            active_magic_links: links.active,
        })
    }
}

fn clamp(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIST_LIMIT)
}
