//! Milestone steps shown on the client progress bar

use serde::Serialize;

use crate::models::ApplicationStatus;

/// One milestone of the progress bar
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProgressStep {
    pub key: ApplicationStatus,
    pub label: &'static str,
    pub description: &'static str,
}

/// Milestones in lifecycle order
pub const PROGRESS_STEPS: [ProgressStep; 8] = [
    ProgressStep {
        key: ApplicationStatus::Received,
        label: "Demande reçue",
        description: "Nous avons bien reçu votre demande de prêt.",
    },
    ProgressStep {
        key: ApplicationStatus::IbvCompleted,
        label: "Vérification bancaire",
        description: "Votre vérification bancaire est complétée.",
    },
    ProgressStep {
        key: ApplicationStatus::AnalysisInProgress,
        label: "Analyse",
        description: "Votre dossier est en cours d'analyse par notre équipe.",
    },
    ProgressStep {
        key: ApplicationStatus::OfferSent,
        label: "Offre envoyée",
        description: "Une offre de prêt vous a été envoyée.",
    },
    ProgressStep {
        key: ApplicationStatus::ApprovedByClient,
        label: "Offre acceptée",
        description: "Vous avez accepté l'offre. Nous préparons votre contrat.",
    },
    ProgressStep {
        key: ApplicationStatus::AwaitingSignature,
        label: "Signature",
        description: "Votre contrat est prêt et attend votre signature.",
    },
    ProgressStep {
        key: ApplicationStatus::Signed,
        label: "Contrat signé",
        description: "Contrat signé. Le transfert des fonds est en préparation.",
    },
    ProgressStep {
        key: ApplicationStatus::Active,
        label: "Prêt actif",
        description: "Les fonds ont été transférés. Votre prêt est actif.",
    },
];

/// Index of the milestone to highlight for `status`.
///
/// A milestone status maps to its own position. Any other status on the main
/// path maps to the closest milestone at or before it (IBV_PENDING shows
/// RECEIVED, CONTRACT_SENT shows APPROVED_BY_CLIENT). Off-track statuses
/// (REFUSED, NO_RESPONSE) map to 0.
pub fn current_step_index(status: ApplicationStatus) -> usize {
    let Some(rank) = status.lifecycle_rank() else {
        return 0;
    };

    PROGRESS_STEPS
        .iter()
        .rposition(|step| step.key.lifecycle_rank().is_some_and(|r| r <= rank))
        .unwrap_or(0)
}
