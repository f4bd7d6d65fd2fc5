//! Data models for the progression server

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Loan application status, in lifecycle order
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "application_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Received,
    IbvPending,
    IbvCompleted,
    AnalysisInProgress,
    OfferPending,
    OfferSent,
    ApprovedByClient,
    ContractPreparation,
    ContractSent,
    AwaitingSignature,
    Signed,
    FundsTransfer,
    Active,
    Refused,
    NoResponse,
}

impl ApplicationStatus {
    /// Position on the main lifecycle path; `None` for off-track outcomes
    pub fn lifecycle_rank(&self) -> Option<u8> {
        match self {
            ApplicationStatus::Received => Some(0),
            ApplicationStatus::IbvPending => Some(1),
            ApplicationStatus::IbvCompleted => Some(2),
            ApplicationStatus::AnalysisInProgress => Some(3),
            ApplicationStatus::OfferPending => Some(4),
            ApplicationStatus::OfferSent => Some(5),
            ApplicationStatus::ApprovedByClient => Some(6),
            ApplicationStatus::ContractPreparation => Some(7),
            ApplicationStatus::ContractSent => Some(8),
            ApplicationStatus::AwaitingSignature => Some(9),
            ApplicationStatus::Signed => Some(10),
            ApplicationStatus::FundsTransfer => Some(11),
            ApplicationStatus::Active => Some(12),
            ApplicationStatus::Refused | ApplicationStatus::NoResponse => None,
        }
    }

    /// Wire name, e.g. `AWAITING_SIGNATURE`
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Received => "RECEIVED",
            ApplicationStatus::IbvPending => "IBV_PENDING",
            ApplicationStatus::IbvCompleted => "IBV_COMPLETED",
            ApplicationStatus::AnalysisInProgress => "ANALYSIS_IN_PROGRESS",
            ApplicationStatus::OfferPending => "OFFER_PENDING",
            ApplicationStatus::OfferSent => "OFFER_SENT",
            ApplicationStatus::ApprovedByClient => "APPROVED_BY_CLIENT",
            ApplicationStatus::ContractPreparation => "CONTRACT_PREPARATION",
            ApplicationStatus::ContractSent => "CONTRACT_SENT",
            ApplicationStatus::AwaitingSignature => "AWAITING_SIGNATURE",
            ApplicationStatus::Signed => "SIGNED",
            ApplicationStatus::FundsTransfer => "FUNDS_TRANSFER",
            ApplicationStatus::Active => "ACTIVE",
            ApplicationStatus::Refused => "REFUSED",
            ApplicationStatus::NoResponse => "NO_RESPONSE",
        }
    }
}

/// Loan application lifecycle record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Application {
    pub id: String,
    pub status: ApplicationStatus,
    pub origin: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub amount_cents: Option<i64>,
    pub first_payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
}

/// Insert-or-update payload for an application
#[derive(Debug, Clone)]
pub struct ApplicationUpsert {
    pub id: String,
    pub status: ApplicationStatus,
    pub origin: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub amount_cents: Option<i64>,
    pub first_payment_date: Option<NaiveDate>,
}

/// Append-only audit event attached to an application
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ApplicationEvent {
    pub id: Uuid,
    pub application_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Operator-authored note on an application
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ClientNote {
    pub id: Uuid,
    pub application_id: String,
    pub message: String,
    pub visible_to_client: bool,
    pub created_at: DateTime<Utc>,
}

/// Persisted magic link; `token_hash` never leaves the server
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct MagicLink {
    pub id: Uuid,
    pub application_id: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
    pub uses: i32,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl MagicLink {
    /// A link is usable iff it is unexpired, unrevoked and under its use limit
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.revoked_at.is_none() && self.uses < self.max_uses
    }
}

/// New link record, built from a freshly generated token
#[derive(Debug, Clone)]
pub struct NewMagicLink {
    pub application_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
}

/// Payment provider webhook, as logged
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PaymentWebhookLog {
    pub id: Uuid,
    pub transaction_id: String,
    pub transaction_type: Option<String>,
    pub transaction_amount: Option<f64>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub environment: Option<String>,
    pub is_validated: bool,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
