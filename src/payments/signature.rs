//! VoPay webhook signature check

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Checks `validation_key == hex(HMAC-SHA1(secret, transaction_id))` in constant time
pub fn validate_webhook_signature(transaction_id: &str, validation_key: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(validation_key.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(transaction_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Signature VoPay would send for `transaction_id`
pub fn sign_transaction(transaction_id: &str, secret: &str) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(transaction_id.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}
