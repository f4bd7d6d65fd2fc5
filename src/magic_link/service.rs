//! Magic link service
//!
//! Core logic for issuing, validating and retiring magic links.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::token::{compute_expiration_from, generate_token, hash_token};
use crate::config::MagicLinkConfig;
use crate::error::ApiError;
use crate::models::{MagicLink, NewMagicLink};
use crate::notify::{SmsMessage, SmsSender};
use crate::store::{ApplicationStore, MagicLinkStore, StoreError, Stores};

/// Longest token accepted for lookup; anything longer is rejected unhashed
const MAX_PRESENTED_TOKEN_LEN: usize = 256;

/// Longest link lifetime an operator may request (one year)
pub const MAX_TTL_HOURS: i64 = 24 * 365;

/// Magic link errors
#[derive(Error, Debug)]
pub enum MagicLinkError {
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Magic link not found")]
    LinkNotFound,

    /// Unknown, expired, revoked and exhausted tokens all end up here
    #[error("Invalid or expired token")]
    InvalidOrExpired,

    #[error("Invalid link parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MagicLinkError> for ApiError {
    fn from(err: MagicLinkError) -> Self {
        match err {
            MagicLinkError::ApplicationNotFound(_) => {
                ApiError::NotFound("Dossier introuvable".to_string())
            }
            MagicLinkError::LinkNotFound => ApiError::NotFound("Lien introuvable".to_string()),
            MagicLinkError::InvalidOrExpired => ApiError::InvalidOrExpiredToken,
            MagicLinkError::InvalidParameters(msg) => ApiError::BadRequest(msg),
            MagicLinkError::Store(e) => e.into(),
        }
    }
}

/// A freshly issued link. `raw_token` is only ever available here.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub id: Uuid,
    pub application_id: String,
    pub raw_token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: i32,
}

/// Rows removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_deleted: u64,
    pub revoked_deleted: u64,
}

/// Magic link service
#[derive(Clone)]
pub struct MagicLinkService {
    links: Arc<dyn MagicLinkStore>,
    applications: Arc<dyn ApplicationStore>,
    sms: Arc<dyn SmsSender>,
    config: MagicLinkConfig,
}

impl MagicLinkService {
    pub fn new(stores: &Stores, sms: Arc<dyn SmsSender>, config: MagicLinkConfig) -> Self {
        Self {
            links: stores.links.clone(),
            applications: stores.applications.clone(),
            sms,
            config,
        }
    }

    pub fn config(&self) -> &MagicLinkConfig {
        &self.config
    }

    /// Client portal URL carrying the raw token
    pub fn link_url(&self, raw_token: &str) -> String {
        format!("{}/suivi?t={}", self.config.public_base_url, raw_token)
    }

    /// Issue a new link for an existing application
    pub async fn issue(
        &self,
        application_id: &str,
        max_uses: i32,
        ttl_hours: i64,
    ) -> Result<IssuedLink, MagicLinkError> {
        if max_uses < 1 {
            return Err(MagicLinkError::InvalidParameters(
                "max_uses doit être au moins 1".to_string(),
            ));
        }
        if !(1..=MAX_TTL_HOURS).contains(&ttl_hours) {
            return Err(MagicLinkError::InvalidParameters(format!(
                "ttl_hours doit être entre 1 et {}",
                MAX_TTL_HOURS
            )));
        }

        self.applications
            .get_application(application_id)
            .await?
            .ok_or_else(|| MagicLinkError::ApplicationNotFound(application_id.to_string()))?;

        let raw_token = generate_token(self.config.token_bytes);
        let expires_at = compute_expiration_from(Utc::now(), ttl_hours);

        let link = self
            .links
            .insert_link(NewMagicLink {
                application_id: application_id.to_string(),
                token_hash: hash_token(&raw_token),
                expires_at,
                max_uses,
            })
            .await?;

        tracing::info!(
            link_id = %link.id,
            application_id = %application_id,
            max_uses,
            expires_at = %expires_at,
            "Magic link issued"
        );

        Ok(IssuedLink {
            id: link.id,
            application_id: link.application_id,
            url: self.link_url(&raw_token),
            raw_token,
            expires_at: link.expires_at,
            max_uses: link.max_uses,
        })
    }

    /// Issue with the configured defaults
    pub async fn issue_default(&self, application_id: &str) -> Result<IssuedLink, MagicLinkError> {
        self.issue(application_id, self.config.max_uses, self.config.ttl_hours)
            .await
    }

    /// Validate a presented token and consume one use
    pub async fn validate(&self, raw_token: &str) -> Result<String, MagicLinkError> {
        self.validate_at(raw_token, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        raw_token: &str,
        now: DateTime<Utc>,
    ) -> Result<String, MagicLinkError> {
        let raw_token = raw_token.trim();
        if raw_token.is_empty() || raw_token.len() > MAX_PRESENTED_TOKEN_LEN {
            return Err(MagicLinkError::InvalidOrExpired);
        }

        match self.links.consume_link(&hash_token(raw_token), now).await? {
            Some(link) => {
                tracing::debug!(
                    link_id = %link.id,
                    uses = link.uses,
                    max_uses = link.max_uses,
                    "Magic link validated"
                );
                Ok(link.application_id)
            }
            None => {
                tracing::debug!("Magic link rejected");
                Err(MagicLinkError::InvalidOrExpired)
            }
        }
    }

    /// Revoke a link. Revoking twice keeps the first revocation time.
    pub async fn revoke(&self, link_id: Uuid) -> Result<MagicLink, MagicLinkError> {
        let link = self
            .links
            .revoke_link(link_id, Utc::now())
            .await?
            .ok_or(MagicLinkError::LinkNotFound)?;

        tracing::info!(link_id = %link.id, application_id = %link.application_id, "Magic link revoked");
        Ok(link)
    }

    pub async fn list_links(
        &self,
        application_id: Option<&str>,
    ) -> Result<Vec<MagicLink>, MagicLinkError> {
        Ok(self.links.list_links(application_id).await?)
    }

    /// Text the link to the applicant.
    ///
    /// Returns whether the provider accepted the message. A failure leaves the
    /// link valid; it is logged with the link id for manual follow-up.
    pub async fn send_link_sms(&self, link: &IssuedLink, phone: &str) -> bool {
        let message = SmsMessage {
            to: phone.to_string(),
            body: format!(
                "Suivez l'avancement de votre demande de prêt en tout temps : {}",
                link.url
            ),
        };

        match self.sms.send_sms(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    link_id = %link.id,
                    application_id = %link.application_id,
                    error = %e,
                    "Magic link SMS not delivered, manual follow-up required"
                );
                false
            }
        }
    }

    /// Delete expired links and links revoked before the retention window
    pub async fn cleanup(&self) -> Result<CleanupReport, MagicLinkError> {
        self.cleanup_at(Utc::now()).await
    }

    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupReport, MagicLinkError> {
        let expired_deleted = self.links.delete_expired_links(now).await?;

        let cutoff = now - Duration::days(self.config.revoked_retention_days);
        let revoked_deleted = self.links.delete_revoked_links_before(cutoff).await?;

        let report = CleanupReport {
            expired_deleted,
            revoked_deleted,
        };
        tracing::info!(
            expired_deleted = report.expired_deleted,
            revoked_deleted = report.revoked_deleted,
            "Magic link cleanup completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationStatus, ApplicationUpsert};
    use crate::notify::{DisabledSmsSender, SmsError};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSms {
        sent: Mutex<Vec<SmsMessage>>,
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send_sms(&self, message: SmsMessage) -> Result<(), SmsError> {
            self.sent.lock().await.push(message);
            Ok(())
        }
    }

    async fn setup_with(sms: Arc<dyn SmsSender>) -> (Arc<MemoryStore>, MagicLinkService) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_application(ApplicationUpsert {
                id: "MARGILL-42".to_string(),
                status: ApplicationStatus::Received,
                origin: "Margill".to_string(),
                name: Some("Jean Roy".to_string()),
                email: None,
                phone: Some("+15145550142".to_string()),
                amount_cents: Some(50_000),
                first_payment_date: None,
            })
            .await
            .unwrap();

        let service = MagicLinkService::new(
            &Stores::memory(store.clone()),
            sms,
            MagicLinkConfig {
                public_base_url: "https://suivi.example.ca".to_string(),
                ..MagicLinkConfig::default()
            },
        );
        (store, service)
    }

    async fn setup() -> (Arc<MemoryStore>, MagicLinkService) {
        setup_with(Arc::new(DisabledSmsSender)).await
    }

    #[tokio::test]
    async fn test_single_use_link_validates_once() {
        let (_, service) = setup().await;
        let issued = service.issue("MARGILL-42", 1, 48).await.unwrap();

        assert_eq!(service.validate(&issued.raw_token).await.unwrap(), "MARGILL-42");
        assert!(matches!(
            service.validate(&issued.raw_token).await,
            Err(MagicLinkError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_validates_exactly_max_uses_times() {
        let (_, service) = setup().await;
        let issued = service.issue("MARGILL-42", 5, 1).await.unwrap();

        for _ in 0..5 {
            assert!(service.validate(&issued.raw_token).await.is_ok());
        }
        assert!(service.validate(&issued.raw_token).await.is_err());
    }

    #[tokio::test]
    async fn test_raw_token_is_not_stored() {
        let (store, service) = setup().await;
        let issued = service.issue("MARGILL-42", 1, 48).await.unwrap();

        let links = store.list_links(Some("MARGILL-42")).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_ne!(links[0].token_hash, issued.raw_token);
        assert_eq!(links[0].token_hash, hash_token(&issued.raw_token));
        assert!(issued.url.ends_with(&format!("/suivi?t={}", issued.raw_token)));
    }

    #[tokio::test]
    async fn test_issue_for_unknown_application_fails() {
        let (_, service) = setup().await;
        assert!(matches!(
            service.issue("MARGILL-404", 1, 48).await,
            Err(MagicLinkError::ApplicationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_invalid_parameters() {
        let (_, service) = setup().await;
        assert!(matches!(
            service.issue("MARGILL-42", 0, 48).await,
            Err(MagicLinkError::InvalidParameters(_))
        ));
        assert!(matches!(
            service.issue("MARGILL-42", 1, 0).await,
            Err(MagicLinkError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_revoked_link_fails_validation() {
        let (_, service) = setup().await;
        let issued = service.issue("MARGILL-42", 10, 48).await.unwrap();

        service.revoke(issued.id).await.unwrap();
        service.revoke(issued.id).await.unwrap();

        assert!(matches!(
            service.validate(&issued.raw_token).await,
            Err(MagicLinkError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_revoke_unknown_link() {
        let (_, service) = setup().await;
        assert!(matches!(
            service.revoke(Uuid::new_v4()).await,
            Err(MagicLinkError::LinkNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_link_fails_regardless_of_uses() {
        let (_, service) = setup().await;
        let issued = service.issue("MARGILL-42", 10, 1).await.unwrap();

        let after_expiry = issued.expires_at + Duration::seconds(1);
        assert!(matches!(
            service.validate_at(&issued.raw_token, after_expiry).await,
            Err(MagicLinkError::InvalidOrExpired)
        ));
        // Exactly at expiry is already too late
        assert!(service
            .validate_at(&issued.raw_token, issued.expires_at)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_tokens_are_invalid() {
        let (_, service) = setup().await;
        let oversized = "x".repeat(1024);
        for token in ["", "   ", "not-a-real-token", oversized.as_str()] {
            assert!(matches!(
                service.validate(token).await,
                Err(MagicLinkError::InvalidOrExpired)
            ));
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_and_old_revoked() {
        let (store, service) = setup().await;
        let now = Utc::now();

        let live = service.issue("MARGILL-42", 1, 48).await.unwrap();
        let expired = service.issue("MARGILL-42", 1, 1).await.unwrap();
        let old_revoked = service.issue("MARGILL-42", 1, 24 * 30).await.unwrap();
        let fresh_revoked = service.issue("MARGILL-42", 1, 24 * 30).await.unwrap();

        let mut links = store.list_links(None).await.unwrap();
        for link in links.iter_mut() {
            if link.id == expired.id {
                link.expires_at = now - Duration::minutes(1);
            } else if link.id == old_revoked.id {
                link.revoked_at = Some(now - Duration::days(8));
            } else if link.id == fresh_revoked.id {
                link.revoked_at = Some(now - Duration::days(1));
            }
            store.put_link(link.clone()).await;
        }

        let report = service.cleanup_at(now).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                expired_deleted: 1,
                revoked_deleted: 1
            }
        );

        let remaining: Vec<Uuid> = store
            .list_links(None)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&live.id));
        assert!(remaining.contains(&fresh_revoked.id));

        // Idempotent
        assert_eq!(service.cleanup_at(now).await.unwrap(), CleanupReport::default());
    }

    #[tokio::test]
    async fn test_deleted_link_is_invalid() {
        let (store, service) = setup().await;
        let issued = service.issue("MARGILL-42", 3, 1).await.unwrap();

        store
            .delete_expired_links(issued.expires_at + Duration::hours(1))
            .await
            .unwrap();

        assert!(matches!(
            service.validate(&issued.raw_token).await,
            Err(MagicLinkError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_sms_contains_link_url() {
        let sms = Arc::new(RecordingSms::default());
        let (_, service) = setup_with(sms.clone()).await;
        let issued = service.issue("MARGILL-42", 1, 48).await.unwrap();

        assert!(service.send_link_sms(&issued, "+15145550142").await);

        let sent = sms.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15145550142");
        assert!(sent[0].body.contains(&issued.url));
    }

    #[tokio::test]
    async fn test_issue_rejects_out_of_range_ttl() {
        let (store, service) = setup().await;

        for ttl_hours in [0, -5, MAX_TTL_HOURS + 1, 10_000_000_000, i64::MAX] {
            assert!(
                matches!(
                    service.issue("MARGILL-42", 1, ttl_hours).await,
                    Err(MagicLinkError::InvalidParameters(_))
                ),
                "ttl_hours {} should be rejected",
                ttl_hours
            );
        }
        assert!(store.list_links(None).await.unwrap().is_empty());

        let longest = service.issue("MARGILL-42", 1, MAX_TTL_HOURS).await.unwrap();
        assert!(longest.expires_at > Utc::now() + Duration::days(364));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_link_expiring_exactly_now() {
        let (store, service) = setup().await;
        let now = Utc::now();

        let boundary = service.issue("MARGILL-42", 1, 1).await.unwrap();
        let just_expired = service.issue("MARGILL-42", 1, 1).await.unwrap();

        for mut link in store.list_links(None).await.unwrap() {
            if link.id == boundary.id {
                link.expires_at = now;
            } else if link.id == just_expired.id {
                link.expires_at = now - Duration::milliseconds(1);
            }
            store.put_link(link).await;
        }

        let report = service.cleanup_at(now).await.unwrap();
        assert_eq!(report.expired_deleted, 1);

        let remaining = store.list_links(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, boundary.id);
        assert_eq!(remaining[0].expires_at, now);
    }

    #[tokio::test]
    async fn test_sms_failure_is_not_fatal() {
        let (_, service) = setup().await;
        let issued = service.issue("MARGILL-42", 1, 48).await.unwrap();

        assert!(!service.send_link_sms(&issued, "+15145550142").await);
        assert!(service.validate(&issued.raw_token).await.is_ok());
    }
}
