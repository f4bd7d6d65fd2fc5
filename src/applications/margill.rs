//! Status updates pushed by the Margill loan management system

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{ApplicationStatus, ApplicationUpsert};

pub const MARGILL_ORIGIN: &str = "Margill";
pub const MARGILL_EVENT_TYPE: &str = "margill_status_change";

/// Map a Margill status label (case-insensitive) to an application status
pub fn map_margill_status(label: &str) -> Option<ApplicationStatus> {
    let status = match label.trim().to_lowercase().as_str() {
        "nouveau_dossier" => ApplicationStatus::Received,
        "en_attente_ibv" => ApplicationStatus::IbvPending,
        "ibv_completee" => ApplicationStatus::IbvCompleted,
        "analyse_en_cours" => ApplicationStatus::AnalysisInProgress,
        "offre_en_preparation" => ApplicationStatus::OfferPending,
        "offre_envoyee" => ApplicationStatus::OfferSent,
        "offre_acceptee" => ApplicationStatus::ApprovedByClient,
        "contrat_en_preparation" => ApplicationStatus::ContractPreparation,
        "contrat_envoye" => ApplicationStatus::ContractSent,
        "en_attente_signature" => ApplicationStatus::AwaitingSignature,
        "contrat_signe" => ApplicationStatus::Signed,
        "transfert_de_fonds" => ApplicationStatus::FundsTransfer,
        "pret_actif" => ApplicationStatus::Active,
        "refuse" => ApplicationStatus::Refused,
        "sans_reponse" => ApplicationStatus::NoResponse,
        _ => return None,
    };
    Some(status)
}

/// Webhook body as sent by Margill
#[derive(Debug, Clone, Deserialize)]
pub struct MargillStatusUpdate {
    /// Margill sends the file number either as a string or as a number
    pub dossier_id: Option<serde_json::Value>,
    pub statut_margill: Option<String>,
    pub nom_client: Option<String>,
    pub email_client: Option<String>,
    pub telephone_client: Option<String>,
    /// Amount in dollars
    pub montant: Option<f64>,
    pub date_premier_paiement: Option<NaiveDate>,
}

/// Result returned to the webhook caller
#[derive(Debug, Clone, Serialize)]
pub struct MargillSyncResult {
    pub application_id: String,
    pub margill_status: String,
    pub mapped_status: ApplicationStatus,
    pub message: String,
}

impl MargillStatusUpdate {
    fn dossier_id(&self) -> Option<String> {
        match self.dossier_id.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Validate the update and turn it into an upsert
    pub fn to_upsert(&self) -> Result<(ApplicationUpsert, String), ApiError> {
        let (Some(dossier_id), Some(statut)) = (
            self.dossier_id(),
            self.statut_margill.as_deref().filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(ApiError::BadRequest(
                "dossier_id et statut_margill requis".to_string(),
            ));
        };

        let status = map_margill_status(statut).ok_or_else(|| {
            tracing::warn!(statut_margill = %statut, "Unknown Margill status");
            ApiError::BadRequest(format!("Statut Margill inconnu: {}", statut))
        })?;

        let amount_cents = match self.montant {
            Some(m) if !m.is_finite() || m < 0.0 => {
                return Err(ApiError::BadRequest("montant invalide".to_string()))
            }
            Some(m) => Some((m * 100.0).round() as i64),
            None => None,
        };

        let upsert = ApplicationUpsert {
            id: format!("MARGILL-{}", dossier_id),
            status,
            origin: MARGILL_ORIGIN.to_string(),
            name: non_blank(&self.nom_client),
            email: non_blank(&self.email_client),
            phone: non_blank(&self.telephone_client),
            amount_cents,
            first_payment_date: self.date_premier_paiement,
        };

        Ok((upsert, statut.to_string()))
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
