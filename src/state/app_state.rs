//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::applications::ApplicationService;
use crate::magic_link::MagicLinkService;
use crate::middleware::{Credentials, RateLimiter};
use crate::notify::SmsSender;
use crate::payments::PaymentService;
use crate::progress::StatusService;
use crate::store::Stores;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub magic_link_service: Arc<MagicLinkService>,
    pub status_service: Arc<StatusService>,
    pub application_service: Arc<ApplicationService>,
    pub payment_service: Arc<PaymentService>,
    pub rate_limiter: RateLimiter,
    pub credentials: Credentials,
    pub stores: Stores,
}

impl AppState {
    /// Wire every service over one set of stores
    pub fn new(
        stores: Stores,
        sms: Arc<dyn SmsSender>,
        config: &crate::config::Config,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            magic_link_service: Arc::new(MagicLinkService::new(
                &stores,
                sms,
                config.magic_link.clone(),
            )),
            status_service: Arc::new(StatusService::new(&stores)),
            application_service: Arc::new(ApplicationService::new(&stores)),
            payment_service: Arc::new(PaymentService::new(
                &stores,
                config.vopay_shared_secret.clone(),
            )),
            rate_limiter,
            credentials: Credentials {
                admin_api_key: config.admin_api_key.clone(),
                cron_secret: config.cron_secret.clone(),
            },
            stores,
        }
    }
}

impl FromRef<AppState> for Arc<MagicLinkService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.magic_link_service.clone()
    }
}

impl FromRef<AppState> for Arc<StatusService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.status_service.clone()
    }
}

impl FromRef<AppState> for Arc<ApplicationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.application_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for RateLimiter {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.rate_limiter.clone()
    }
}

impl FromRef<AppState> for Credentials {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for Stores {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.stores.clone()
    }
}
