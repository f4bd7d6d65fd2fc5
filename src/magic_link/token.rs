//! Magic link token codec
//!
//! Raw tokens are URL-safe base64 of CSPRNG bytes. Only their SHA-256 hash is
//! ever persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Default number of random bytes in a token
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Generate a random opaque token of `byte_len` random bytes.
///
/// The encoded length only depends on `byte_len`. Panics if the operating
/// system RNG is unavailable.
pub fn generate_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a raw token for storage and lookup
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Expiration instant `ttl_hours` from now
pub fn compute_expiration(ttl_hours: i64) -> DateTime<Utc> {
    compute_expiration_from(Utc::now(), ttl_hours)
}

pub fn compute_expiration_from(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(ttl_hours)
}
