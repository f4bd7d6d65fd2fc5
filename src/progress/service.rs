//! Status composer

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::steps::{current_step_index, ProgressStep, PROGRESS_STEPS};
use crate::error::ApiError;
use crate::models::{Application, ApplicationStatus, ClientNote};
use crate::store::{ApplicationStore, NoteStore, Stores};

/// Application fields shown to the applicant
#[derive(Debug, Clone, Serialize)]
pub struct ClientApplicationView {
    pub id: String,
    pub status: ApplicationStatus,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub amount_cents: Option<i64>,
    pub first_payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
}

impl From<Application> for ClientApplicationView {
    fn from(application: Application) -> Self {
        Self {
            id: application.id,
            status: application.status,
            name: application.name,
            email: application.email,
            phone: application.phone,
            amount_cents: application.amount_cents,
            first_payment_date: application.first_payment_date,
            created_at: application.created_at,
            status_updated_at: application.status_updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientNoteView {
    pub id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<ClientNote> for ClientNoteView {
    fn from(note: ClientNote) -> Self {
        Self {
            id: note.id,
            message: note.message,
            created_at: note.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub current_step_index: usize,
    pub total_steps: usize,
    pub steps: Vec<ProgressStep>,
}

impl ProgressView {
    pub fn for_status(status: ApplicationStatus) -> Self {
        Self {
            current_step_index: current_step_index(status),
            total_steps: PROGRESS_STEPS.len(),
            steps: PROGRESS_STEPS.to_vec(),
        }
    }
}

/// Everything the client portal renders
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub application: ClientApplicationView,
    pub notes: Vec<ClientNoteView>,
    pub progress: ProgressView,
}

/// Builds the client status view. Read-only.
#[derive(Clone)]
pub struct StatusService {
    applications: Arc<dyn ApplicationStore>,
    notes: Arc<dyn NoteStore>,
}

impl StatusService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            applications: stores.applications.clone(),
            notes: stores.notes.clone(),
        }
    }

    pub async fn compose(&self, application_id: &str) -> Result<ClientStatus, ApiError> {
        let application = self
            .applications
            .get_application(application_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Dossier introuvable".to_string()))?;

        let notes = self.notes.list_client_notes(application_id).await?;

        Ok(ClientStatus {
            progress: ProgressView::for_status(application.status),
            application: application.into(),
            notes: notes.into_iter().map(ClientNoteView::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationUpsert;
    use crate::store::MemoryStore;

    async fn seeded(status: ApplicationStatus) -> (Arc<MemoryStore>, StatusService) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_application(ApplicationUpsert {
                id: "MARGILL-7".to_string(),
                status,
                origin: "Margill".to_string(),
                name: Some("Sophie Gagnon".to_string()),
                email: Some("sophie@example.ca".to_string()),
                phone: None,
                amount_cents: Some(100_000),
                first_payment_date: None,
            })
            .await
            .unwrap();
        let service = StatusService::new(&Stores::memory(store.clone()));
        (store, service)
    }

    #[tokio::test]
    async fn test_compose_awaiting_signature() {
        let (_, service) = seeded(ApplicationStatus::AwaitingSignature).await;
        let status = service.compose("MARGILL-7").await.unwrap();

        let expected = PROGRESS_STEPS
            .iter()
            .position(|s| s.key == ApplicationStatus::AwaitingSignature)
            .unwrap();
        assert_eq!(status.progress.current_step_index, expected);
        assert_eq!(status.progress.total_steps, 8);
        assert_eq!(status.application.status, ApplicationStatus::AwaitingSignature);
    }

    #[tokio::test]
    async fn test_compose_only_client_visible_notes() {
        let (store, service) = seeded(ApplicationStatus::Received).await;
        store.insert_note("MARGILL-7", "Bienvenue", true).await.unwrap();
        store.insert_note("MARGILL-7", "Vérifier l'employeur", false).await.unwrap();

        let status = service.compose("MARGILL-7").await.unwrap();
        assert_eq!(status.notes.len(), 1);
        assert_eq!(status.notes[0].message, "Bienvenue");
    }

    #[tokio::test]
    async fn test_compose_unknown_application() {
        let (_, service) = seeded(ApplicationStatus::Received).await;
        assert!(matches!(
            service.compose("MARGILL-0").await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_progress_view_serializes_camel_case() {
        let json = serde_json::to_value(ProgressView::for_status(ApplicationStatus::Signed)).unwrap();
        assert_eq!(json["currentStepIndex"], 6);
        assert_eq!(json["totalSteps"], 8);
        assert_eq!(json["steps"][0]["key"], "RECEIVED");
    }
}
