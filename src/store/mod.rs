//! Persistence seams
//!
//! Services talk to these traits rather than to a pool directly so the same
//! code runs against Postgres in production and against [`MemoryStore`] in
//! development and tests.

mod memory;
mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Application, ApplicationEvent, ApplicationUpsert, ClientNote, MagicLink, NewMagicLink,
    PaymentWebhookLog,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application totals grouped for the operator dashboard
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ApplicationCounts {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_origin: BTreeMap<String, i64>,
}

/// Magic link totals; `active` counts links that would still validate
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LinkCounts {
    pub total: i64,
    pub active: i64,
}

/// Payment webhook row before insertion
#[derive(Debug, Clone)]
pub struct NewPaymentLog {
    pub transaction_id: String,
    pub transaction_type: Option<String>,
    pub transaction_amount: Option<f64>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub environment: Option<String>,
    pub is_validated: bool,
    pub raw_payload: serde_json::Value,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError>;

    /// Create the application or update its status; absent contact fields keep their value
    async fn upsert_application(&self, upsert: ApplicationUpsert)
        -> Result<Application, StoreError>;

    /// Newest first
    async fn list_applications(&self, limit: i64) -> Result<Vec<Application>, StoreError>;

    async fn count_applications(&self) -> Result<ApplicationCounts, StoreError>;

    async fn insert_event(
        &self,
        application_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<ApplicationEvent, StoreError>;

    /// Newest first
    async fn list_events(&self, limit: i64) -> Result<Vec<ApplicationEvent>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn insert_note(
        &self,
        application_id: &str,
        message: &str,
        visible_to_client: bool,
    ) -> Result<ClientNote, StoreError>;

    /// Client-visible notes for one application, newest first
    async fn list_client_notes(&self, application_id: &str)
        -> Result<Vec<ClientNote>, StoreError>;

    /// All notes, newest first
    async fn list_notes(&self, limit: i64) -> Result<Vec<ClientNote>, StoreError>;
}

#[async_trait]
pub trait MagicLinkStore: Send + Sync {
    async fn insert_link(&self, link: NewMagicLink) -> Result<MagicLink, StoreError>;

    /// Atomically checks usability at `now` and records one use.
    ///
    /// Returns `None` when no usable link matches the hash. Concurrent callers
    /// can never push `uses` past `max_uses`.
    async fn consume_link(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError>;

    /// Sets `revoked_at` unless already set. `None` when the link does not exist.
    async fn revoke_link(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError>;

    /// Newest first, optionally scoped to one application
    async fn list_links(&self, application_id: Option<&str>)
        -> Result<Vec<MagicLink>, StoreError>;

    async fn count_links(&self, now: DateTime<Utc>) -> Result<LinkCounts, StoreError>;

    /// Deletes links with `expires_at < now`
    async fn delete_expired_links(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Deletes links revoked before `cutoff`
    async fn delete_revoked_links_before(&self, cutoff: DateTime<Utc>)
        -> Result<u64, StoreError>;
}

#[async_trait]
pub trait PaymentLogStore: Send + Sync {
    async fn insert_payment_log(&self, log: NewPaymentLog)
        -> Result<PaymentWebhookLog, StoreError>;
}

/// Handles to every store, shared by the services
#[derive(Clone)]
pub struct Stores {
    pub applications: Arc<dyn ApplicationStore>,
    pub notes: Arc<dyn NoteStore>,
    pub links: Arc<dyn MagicLinkStore>,
    pub payments: Arc<dyn PaymentLogStore>,
    pub backend: &'static str,
}

impl Stores {
    /// All stores backed by one Postgres pool
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            applications: store.clone(),
            notes: store.clone(),
            links: store.clone(),
            payments: store,
            backend: "postgres",
        }
    }

    /// All stores backed by a shared in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            applications: store.clone(),
            notes: store.clone(),
            links: store.clone(),
            payments: store,
            backend: "memory",
        }
    }
}
