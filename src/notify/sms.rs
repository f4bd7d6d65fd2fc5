//! SMS delivery

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TwilioConfig;

/// SMS delivery errors
#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS delivery is not configured")]
    NotConfigured,

    #[error("SMS provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("SMS provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Outgoing text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, message: SmsMessage) -> Result<(), SmsError>;
}

/// Sends through the Twilio Messages API
#[derive(Clone)]
pub struct TwilioSmsSender {
    http: reqwest::Client,
    config: TwilioConfig,
    api_base: String,
}

impl TwilioSmsSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            api_base: "https://api.twilio.com".to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send_sms(&self, message: SmsMessage) -> Result<(), SmsError> {
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", message.to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", message.body.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(to = %mask_phone(&message.to), "SMS sent");
        Ok(())
    }
}

/// Used when no provider is configured; every send fails with `NotConfigured`
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSmsSender;

#[async_trait]
impl SmsSender for DisabledSmsSender {
    async fn send_sms(&self, message: SmsMessage) -> Result<(), SmsError> {
        tracing::warn!(to = %mask_phone(&message.to), "SMS provider not configured, message dropped");
        Err(SmsError::NotConfigured)
    }
}

/// Keeps the last four digits, e.g. `*******0100`
pub(crate) fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    let visible = digits.len().min(4);
    let hidden = digits.len() - visible;
    let tail: String = digits[hidden..].iter().collect();
    format!("{}{}", "*".repeat(hidden), tail)
}
