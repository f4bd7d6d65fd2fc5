//! Postgres store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ApplicationCounts, ApplicationStore, LinkCounts, MagicLinkStore, NewPaymentLog, NoteStore,
    PaymentLogStore, StoreError,
};
use crate::models::{
    Application, ApplicationEvent, ApplicationUpsert, ClientNote, MagicLink, NewMagicLink,
    PaymentWebhookLog,
};

const APPLICATION_COLUMNS: &str = "id, status, origin, name, email, phone, amount_cents, \
     first_payment_date, created_at, status_updated_at";

const LINK_COLUMNS: &str = "id, application_id, token_hash, expires_at, max_uses, uses, \
     revoked_at, created_at, last_used_at";

/// Store backed by a Postgres pool
#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError> {
        let application = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(application)
    }

    async fn upsert_application(
        &self,
        upsert: ApplicationUpsert,
    ) -> Result<Application, StoreError> {
        let application = sqlx::query_as::<_, Application>(&format!(
            r#"
            INSERT INTO applications (
                id, status, origin, name, email, phone, amount_cents,
                first_payment_date, created_at, status_updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                status_updated_at = NOW(),
                origin = EXCLUDED.origin,
                name = COALESCE(EXCLUDED.name, applications.name),
                email = COALESCE(EXCLUDED.email, applications.email),
                phone = COALESCE(EXCLUDED.phone, applications.phone),
                amount_cents = COALESCE(EXCLUDED.amount_cents, applications.amount_cents),
                first_payment_date = COALESCE(EXCLUDED.first_payment_date, applications.first_payment_date)
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(&upsert.id)
        .bind(upsert.status)
        .bind(&upsert.origin)
        .bind(&upsert.name)
        .bind(&upsert.email)
        .bind(&upsert.phone)
        .bind(upsert.amount_cents)
        .bind(upsert.first_payment_date)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(application)
    }

    async fn list_applications(&self, limit: i64) -> Result<Vec<Application>, StoreError> {
        let applications = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(applications)
    }

    async fn count_applications(&self) -> Result<ApplicationCounts, StoreError> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status::text, COUNT(*) FROM applications GROUP BY status",
        )
        .fetch_all(&self.db_pool)
        .await?;

        let by_origin: Vec<(String, i64)> = sqlx::query_as(
            "SELECT COALESCE(origin, 'Unknown'), COUNT(*) FROM applications GROUP BY 1",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(ApplicationCounts {
            total: by_status.iter().map(|(_, count)| count).sum(),
            by_status: by_status.into_iter().collect(),
            by_origin: by_origin.into_iter().collect(),
        })
    }

    async fn insert_event(
        &self,
        application_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<ApplicationEvent, StoreError> {
        let event = sqlx::query_as::<_, ApplicationEvent>(
            r#"
            INSERT INTO application_events (id, application_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, application_id, event_type, payload, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(event)
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<ApplicationEvent>, StoreError> {
        let events = sqlx::query_as::<_, ApplicationEvent>(
            r#"
            SELECT id, application_id, event_type, payload, created_at
            FROM application_events
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(events)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn insert_note(
        &self,
        application_id: &str,
        message: &str,
        visible_to_client: bool,
    ) -> Result<ClientNote, StoreError> {
        let note = sqlx::query_as::<_, ClientNote>(
            r#"
            INSERT INTO client_notes (id, application_id, message, visible_to_client)
            VALUES ($1, $2, $3, $4)
            RETURNING id, application_id, message, visible_to_client, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(message)
        .bind(visible_to_client)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(note)
    }

    async fn list_client_notes(
        &self,
        application_id: &str,
    ) -> Result<Vec<ClientNote>, StoreError> {
        let notes = sqlx::query_as::<_, ClientNote>(
            r#"
            SELECT id, application_id, message, visible_to_client, created_at
            FROM client_notes
            WHERE application_id = $1 AND visible_to_client = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(notes)
    }

    async fn list_notes(&self, limit: i64) -> Result<Vec<ClientNote>, StoreError> {
        let notes = sqlx::query_as::<_, ClientNote>(
            r#"
            SELECT id, application_id, message, visible_to_client, created_at
            FROM client_notes
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(notes)
    }
}

#[async_trait]
impl MagicLinkStore for PgStore {
    async fn insert_link(&self, link: NewMagicLink) -> Result<MagicLink, StoreError> {
        let link = sqlx::query_as::<_, MagicLink>(&format!(
            r#"
            INSERT INTO magic_links (id, application_id, token_hash, expires_at, max_uses)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&link.application_id)
        .bind(&link.token_hash)
        .bind(link.expires_at)
        .bind(link.max_uses)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(link)
    }

    async fn consume_link(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError> {
        // Single conditional update: the row lock serializes concurrent callers
        let link = sqlx::query_as::<_, MagicLink>(&format!(
            r#"
            UPDATE magic_links
            SET uses = uses + 1, last_used_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > $2
              AND uses < max_uses
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(link)
    }

    async fn revoke_link(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError> {
        let link = sqlx::query_as::<_, MagicLink>(&format!(
            r#"
            UPDATE magic_links
            SET revoked_at = COALESCE(revoked_at, $2)
            WHERE id = $1
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(link)
    }

    async fn list_links(
        &self,
        application_id: Option<&str>,
    ) -> Result<Vec<MagicLink>, StoreError> {
        let links = sqlx::query_as::<_, MagicLink>(&format!(
            r#"
            SELECT {LINK_COLUMNS}
            FROM magic_links
            WHERE ($1::text IS NULL OR application_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(application_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(links)
    }

    async fn count_links(&self, now: DateTime<Utc>) -> Result<LinkCounts, StoreError> {
        let (total, active): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (
                    WHERE expires_at > $1 AND revoked_at IS NULL AND uses < max_uses
                )
            FROM magic_links
            "#,
        )
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(LinkCounts { total, active })
    }

    async fn delete_expired_links(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM magic_links WHERE expires_at < $1")
            .bind(now)
            .execute(&self.db_pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn delete_revoked_links_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            "DELETE FROM magic_links WHERE revoked_at IS NOT NULL AND revoked_at < $1",
        )
        .bind(cutoff)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}

#[async_trait]
impl PaymentLogStore for PgStore {
    async fn insert_payment_log(
        &self,
        log: NewPaymentLog,
    ) -> Result<PaymentWebhookLog, StoreError> {
        let row = sqlx::query_as::<_, PaymentWebhookLog>(
            r#"
            INSERT INTO payment_webhook_logs (
                id, transaction_id, transaction_type, transaction_amount, status,
                failure_reason, environment, is_validated, raw_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, transaction_id, transaction_type, transaction_amount, status,
                      failure_reason, environment, is_validated, raw_payload, received_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&log.transaction_id)
        .bind(&log.transaction_type)
        .bind(log.transaction_amount)
        .bind(&log.status)
        .bind(&log.failure_reason)
        .bind(&log.environment)
        .bind(log.is_validated)
        .bind(&log.raw_payload)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(row)
    }
}
