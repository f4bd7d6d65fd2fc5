//! In-memory store
//!
//! Process-local and lost on restart. Every mutation happens under one write
//! lock, which is what makes `consume_link` a single check-and-increment.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ApplicationCounts, ApplicationStore, LinkCounts, MagicLinkStore, NewPaymentLog, NoteStore,
    PaymentLogStore, StoreError,
};
use crate::models::{
    Application, ApplicationEvent, ApplicationUpsert, ClientNote, MagicLink, NewMagicLink,
    PaymentWebhookLog,
};

#[derive(Default)]
struct MemoryState {
    applications: HashMap<String, Application>,
    events: Vec<ApplicationEvent>,
    notes: Vec<ClientNote>,
    links: HashMap<Uuid, MagicLink>,
    payment_logs: Vec<PaymentWebhookLog>,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payment logs received so far, oldest first
    pub async fn payment_logs(&self) -> Vec<PaymentWebhookLog> {
        self.state.read().await.payment_logs.clone()
    }

    /// Overwrites a stored link, e.g. to backdate it
    pub async fn put_link(&self, link: MagicLink) {
        self.state.write().await.links.insert(link.id, link);
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn get_application(&self, id: &str) -> Result<Option<Application>, StoreError> {
        Ok(self.state.read().await.applications.get(id).cloned())
    }

    async fn upsert_application(
        &self,
        upsert: ApplicationUpsert,
    ) -> Result<Application, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let application = state
            .applications
            .entry(upsert.id.clone())
            .and_modify(|existing| {
                existing.status = upsert.status;
                existing.status_updated_at = now;
                existing.origin = Some(upsert.origin.clone());
                if upsert.name.is_some() {
                    existing.name = upsert.name.clone();
                }
                if upsert.email.is_some() {
                    existing.email = upsert.email.clone();
                }
                if upsert.phone.is_some() {
                    existing.phone = upsert.phone.clone();
                }
                if upsert.amount_cents.is_some() {
                    existing.amount_cents = upsert.amount_cents;
                }
                if upsert.first_payment_date.is_some() {
                    existing.first_payment_date = upsert.first_payment_date;
                }
            })
            .or_insert_with(|| Application {
                id: upsert.id.clone(),
                status: upsert.status,
                origin: Some(upsert.origin.clone()),
                name: upsert.name.clone(),
                email: upsert.email.clone(),
                phone: upsert.phone.clone(),
                amount_cents: upsert.amount_cents,
                first_payment_date: upsert.first_payment_date,
                created_at: now,
                status_updated_at: now,
            });

        Ok(application.clone())
    }

    async fn list_applications(&self, limit: i64) -> Result<Vec<Application>, StoreError> {
        let state = self.state.read().await;
        let mut applications: Vec<Application> = state.applications.values().cloned().collect();
        newest_first(&mut applications, |a| a.created_at);
        applications.truncate(clamp_limit(limit));
        Ok(applications)
    }

    async fn count_applications(&self) -> Result<ApplicationCounts, StoreError> {
        let state = self.state.read().await;
        let mut counts = ApplicationCounts::default();

        for application in state.applications.values() {
            counts.total += 1;
            *counts
                .by_status
                .entry(application.status.as_str().to_string())
                .or_insert(0) += 1;
            let origin = application
                .origin
                .clone()
                .unwrap_or_else(|| "Unknown".to_string());
            *counts.by_origin.entry(origin).or_insert(0) += 1;
        }

        Ok(counts)
    }

    async fn insert_event(
        &self,
        application_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<ApplicationEvent, StoreError> {
        let event = ApplicationEvent {
            id: Uuid::new_v4(),
            application_id: application_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        self.state.write().await.events.push(event.clone());
        Ok(event)
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<ApplicationEvent>, StoreError> {
        let state = self.state.read().await;
        let mut events = state.events.clone();
        newest_first(&mut events, |e| e.created_at);
        events.truncate(clamp_limit(limit));
        Ok(events)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn insert_note(
        &self,
        application_id: &str,
        message: &str,
        visible_to_client: bool,
    ) -> Result<ClientNote, StoreError> {
        let note = ClientNote {
            id: Uuid::new_v4(),
            application_id: application_id.to_string(),
            message: message.to_string(),
            visible_to_client,
            created_at: Utc::now(),
        };
        self.state.write().await.notes.push(note.clone());
        Ok(note)
    }

    async fn list_client_notes(
        &self,
        application_id: &str,
    ) -> Result<Vec<ClientNote>, StoreError> {
        let state = self.state.read().await;
        // Insertion order breaks ties between notes created in the same instant
        let mut notes: Vec<ClientNote> = state
            .notes
            .iter()
            .rev()
            .filter(|n| n.application_id == application_id && n.visible_to_client)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn list_notes(&self, limit: i64) -> Result<Vec<ClientNote>, StoreError> {
        let state = self.state.read().await;
        let mut notes: Vec<ClientNote> = state.notes.iter().rev().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes.truncate(clamp_limit(limit));
        Ok(notes)
    }
}

#[async_trait]
impl MagicLinkStore for MemoryStore {
    async fn insert_link(&self, link: NewMagicLink) -> Result<MagicLink, StoreError> {
        let mut state = self.state.write().await;

        if state.links.values().any(|l| l.token_hash == link.token_hash) {
            return Err(StoreError::Conflict("token hash already exists".to_string()));
        }

        let link = MagicLink {
            id: Uuid::new_v4(),
            application_id: link.application_id,
            token_hash: link.token_hash,
            expires_at: link.expires_at,
            max_uses: link.max_uses,
            uses: 0,
            revoked_at: None,
            created_at: Utc::now(),
            last_used_at: None,
        };
        state.links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn consume_link(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError> {
        let mut state = self.state.write().await;

        let Some(link) = state
            .links
            .values_mut()
            .find(|l| l.token_hash == token_hash)
        else {
            return Ok(None);
        };

        if !link.is_usable_at(now) {
            return Ok(None);
        }

        link.uses += 1;
        link.last_used_at = Some(now);
        Ok(Some(link.clone()))
    }

    async fn revoke_link(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<MagicLink>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.links.get_mut(&id).map(|link| {
            if link.revoked_at.is_none() {
                link.revoked_at = Some(now);
            }
            link.clone()
        }))
    }

    async fn list_links(
        &self,
        application_id: Option<&str>,
    ) -> Result<Vec<MagicLink>, StoreError> {
        let state = self.state.read().await;
        let mut links: Vec<MagicLink> = state
            .links
            .values()
            .filter(|l| application_id.map_or(true, |id| l.application_id == id))
            .cloned()
            .collect();
        newest_first(&mut links, |l| l.created_at);
        Ok(links)
    }

    async fn count_links(&self, now: DateTime<Utc>) -> Result<LinkCounts, StoreError> {
        let state = self.state.read().await;
        let total = state.links.len() as i64;
        let active = state.links.values().filter(|l| l.is_usable_at(now)).count() as i64;
        Ok(LinkCounts { total, active })
    }

    async fn delete_expired_links(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state.links.retain(|_, link| link.expires_at >= now);
        Ok((before - state.links.len()) as u64)
    }

    async fn delete_revoked_links_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state
            .links
            .retain(|_, link| !matches!(link.revoked_at, Some(revoked_at) if revoked_at < cutoff));
        Ok((before - state.links.len()) as u64)
    }
}

#[async_trait]
impl PaymentLogStore for MemoryStore {
    async fn insert_payment_log(
        &self,
        log: NewPaymentLog,
    ) -> Result<PaymentWebhookLog, StoreError> {
        let row = PaymentWebhookLog {
            id: Uuid::new_v4(),
            transaction_id: log.transaction_id,
            transaction_type: log.transaction_type,
            transaction_amount: log.transaction_amount,
            status: log.status,
            failure_reason: log.failure_reason,
            environment: log.environment,
            is_validated: log.is_validated,
            raw_payload: log.raw_payload,
            received_at: Utc::now(),
        };
        self.state.write().await.payment_logs.push(row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::Duration;
    use std::sync::Arc;

    fn upsert(id: &str, status: ApplicationStatus) -> ApplicationUpsert {
        ApplicationUpsert {
            id: id.to_string(),
            status,
            origin: "Margill".to_string(),
            name: Some("Marie Tremblay".to_string()),
            email: None,
            phone: Some("+15145550100".to_string()),
            amount_cents: Some(75_000),
            first_payment_date: None,
        }
    }

    fn new_link(hash: &str, expires_at: DateTime<Utc>, max_uses: i32) -> NewMagicLink {
        NewMagicLink {
            application_id: "MARGILL-1".to_string(),
            token_hash: hash.to_string(),
            expires_at,
            max_uses,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_contact_fields_when_absent() {
        let store = MemoryStore::new();
        store
            .upsert_application(upsert("MARGILL-1", ApplicationStatus::Received))
            .await
            .unwrap();

        let mut update = upsert("MARGILL-1", ApplicationStatus::OfferSent);
        update.name = None;
        let updated = store.upsert_application(update).await.unwrap();

        assert_eq!(updated.status, ApplicationStatus::OfferSent);
        assert_eq!(updated.name.as_deref(), Some("Marie Tremblay"));
    }

    #[tokio::test]
    async fn test_consume_stops_at_max_uses() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_link(new_link("h1", now + Duration::hours(1), 2))
            .await
            .unwrap();

        assert!(store.consume_link("h1", now).await.unwrap().is_some());
        let second = store.consume_link("h1", now).await.unwrap().unwrap();
        assert_eq!(second.uses, 2);
        assert_eq!(second.last_used_at, Some(now));
        assert!(store.consume_link("h1", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consume_never_exceeds_max_uses() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .insert_link(new_link("shared", now + Duration::hours(1), 3))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.consume_link("shared", now).await.unwrap().is_some()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 3);
        let links = store.list_links(None).await.unwrap();
        assert_eq!(links[0].uses, 3);
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_rejected() {
        let store = MemoryStore::new();
        let expires = Utc::now() + Duration::hours(1);
        store.insert_link(new_link("dup", expires, 1)).await.unwrap();
        let err = store.insert_link(new_link("dup", expires, 1)).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_revoke_keeps_first_timestamp() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let link = store
            .insert_link(new_link("r", now + Duration::hours(1), 1))
            .await
            .unwrap();

        let first = store.revoke_link(link.id, now).await.unwrap().unwrap();
        let later = now + Duration::minutes(5);
        let second = store.revoke_link(link.id, later).await.unwrap().unwrap();

        assert_eq!(first.revoked_at, Some(now));
        assert_eq!(second.revoked_at, Some(now));
        assert!(store.revoke_link(Uuid::new_v4(), now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_notes_filtered_and_newest_first() {
        let store = MemoryStore::new();
        store.insert_note("MARGILL-1", "premier", true).await.unwrap();
        store.insert_note("MARGILL-1", "interne", false).await.unwrap();
        store.insert_note("MARGILL-1", "second", true).await.unwrap();
        store.insert_note("MARGILL-2", "autre", true).await.unwrap();

        let notes = store.list_client_notes("MARGILL-1").await.unwrap();
        let messages: Vec<&str> = notes.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "premier"]);
    }

    #[tokio::test]
    async fn test_counts_group_by_status_and_origin() {
        let store = MemoryStore::new();
        store
            .upsert_application(upsert("MARGILL-1", ApplicationStatus::Received))
            .await
            .unwrap();
        store
            .upsert_application(upsert("MARGILL-2", ApplicationStatus::Received))
            .await
            .unwrap();
        store
            .upsert_application(upsert("MARGILL-3", ApplicationStatus::Signed))
            .await
            .unwrap();

        let counts = store.count_applications().await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.by_status.get("RECEIVED"), Some(&2));
        assert_eq!(counts.by_status.get("SIGNED"), Some(&1));
        assert_eq!(counts.by_origin.get("Margill"), Some(&3));
    }
}
