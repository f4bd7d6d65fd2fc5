//! Payment webhook logging

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signature::validate_webhook_signature;
use crate::error::ApiError;
use crate::store::{NewPaymentLog, PaymentLogStore, Stores};

/// VoPay transaction status notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoPayWebhook {
    #[serde(rename = "TransactionID")]
    pub transaction_id: Option<String>,
    pub transaction_type: Option<String>,
    /// Sent as a decimal string, occasionally as a number
    pub transaction_amount: Option<serde_json::Value>,
    pub status: Option<String>,
    pub validation_key: Option<String>,
    pub failure_reason: Option<String>,
    pub environment: Option<String>,
}

impl VoPayWebhook {
    fn amount(&self) -> Option<f64> {
        match self.transaction_amount.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub log_id: Uuid,
    pub transaction_id: String,
    pub status: String,
}

pub struct PaymentService {
    logs: Arc<dyn PaymentLogStore>,
    shared_secret: Option<String>,
}

impl PaymentService {
    pub fn new(stores: &Stores, shared_secret: Option<String>) -> Self {
        Self {
            logs: stores.payments.clone(),
            shared_secret,
        }
    }

    /// Verify and record a webhook
    pub async fn process_webhook(
        &self,
        raw: serde_json::Value,
    ) -> Result<PaymentReceipt, ApiError> {
        let webhook: VoPayWebhook = serde_json::from_value(raw.clone())?;

        let (Some(transaction_id), Some(status), Some(validation_key)) = (
            non_empty(&webhook.transaction_id),
            non_empty(&webhook.status),
            non_empty(&webhook.validation_key),
        ) else {
            tracing::warn!("VoPay webhook missing required fields");
            return Err(ApiError::BadRequest("Missing required fields".to_string()));
        };

        let secret = self.shared_secret.as_deref().ok_or_else(|| {
            tracing::error!("VOPAY_SHARED_SECRET is not configured");
            ApiError::ServiceUnavailable("VoPay webhook not configured".to_string())
        })?;

        if !validate_webhook_signature(transaction_id, validation_key, secret) {
            tracing::warn!(transaction_id = %transaction_id, "Invalid VoPay signature");
            return Err(ApiError::Unauthorized("Invalid signature".to_string()));
        }

        let status = status.to_lowercase();
        let log = self
            .logs
            .insert_payment_log(NewPaymentLog {
                transaction_id: transaction_id.to_string(),
                transaction_type: webhook.transaction_type.clone(),
                transaction_amount: webhook.amount(),
                status: status.clone(),
                failure_reason: webhook.failure_reason.clone(),
                environment: webhook.environment.clone(),
                is_validated: true,
                raw_payload: raw,
            })
            .await?;

        tracing::info!(
            transaction_id = %log.transaction_id,
            status = %log.status,
            log_id = %log.id,
            "VoPay webhook recorded"
        );

        Ok(PaymentReceipt {
            log_id: log.id,
            transaction_id: log.transaction_id,
            status,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
