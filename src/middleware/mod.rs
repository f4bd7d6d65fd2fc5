//! Middleware for the progression API
//!
//! Request tracing, rate limiting, security headers and the operator/cron
//! credential extractors.

pub mod auth;
pub mod rate_limiter;
mod security;
mod tracing;

pub use auth::{AdminKey, CronAuth, Credentials};
pub use rate_limiter::{
    client_ip, rate_limit, MemoryRateLimitStore, RateLimitDecision, RateLimitStore, RateLimiter,
};
pub use security::{hsts_header, security_headers};
pub use self::tracing::request_tracing;
