//! Payment provider (VoPay) webhook intake

mod service;
pub mod signature;

pub use service::{PaymentReceipt, PaymentService, VoPayWebhook};
pub use signature::validate_webhook_signature;
