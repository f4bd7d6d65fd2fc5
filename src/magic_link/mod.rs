//! Magic links for client status tracking
//!
//! - Token generation and hashing
//! - Issuance, validation with bounded uses, revocation
//! - Cleanup of expired and long-revoked links

mod service;
pub mod token;

pub use service::{CleanupReport, IssuedLink, MagicLinkError, MagicLinkService, MAX_TTL_HOURS};
pub use token::{compute_expiration, generate_token, hash_token};
