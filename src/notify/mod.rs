//! Client notifications
//!
//! Delivery is best-effort: callers log failures and carry on.

mod sms;

pub use sms::{DisabledSmsSender, SmsError, SmsMessage, SmsSender, TwilioSmsSender};
