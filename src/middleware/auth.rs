//! Operator and scheduler authentication
//!
//! Both credentials come from configuration. When a credential is not
//! configured the protected routes answer 503 instead of opening up.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use sha2::{Digest, Sha256};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared secrets for operator and cron routes
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub admin_api_key: Option<String>,
    pub cron_secret: Option<String>,
}

/// Extractor for operator routes: requires `x-api-key` to match the admin key
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

#[async_trait]
impl<S> FromRequestParts<S> for AdminKey
where
    Credentials: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_ref(state);
        let expected = credentials.admin_api_key.as_deref().ok_or_else(|| {
            tracing::error!("ADMIN_API_KEY is not configured");
            ApiError::ServiceUnavailable("Admin API not configured".to_string())
        })?;

        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;

        if !secrets_match(provided, expected) {
            tracing::warn!(path = %parts.uri.path(), "Rejected admin API key");
            return Err(ApiError::Unauthorized("Unauthorized".to_string()));
        }

        Ok(AdminKey)
    }
}

/// Extractor for scheduler routes: requires `Authorization: Bearer <CRON_SECRET>`
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

#[async_trait]
impl<S> FromRequestParts<S> for CronAuth
where
    Credentials: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_ref(state);
        let expected = credentials.cron_secret.as_deref().ok_or_else(|| {
            tracing::error!("CRON_SECRET is not configured");
            ApiError::ServiceUnavailable("Cron not configured".to_string())
        })?;

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::Unauthorized("Unauthorized".to_string()))?;

        if !secrets_match(bearer.token(), expected) {
            tracing::warn!("Rejected cron secret");
            return Err(ApiError::Unauthorized("Unauthorized".to_string()));
        }

        Ok(CronAuth)
    }
}

/// Compares digests so timing does not depend on where the inputs differ
fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
