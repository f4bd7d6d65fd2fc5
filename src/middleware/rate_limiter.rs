//! Fixed-window rate limiting for the public status route

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Request count inside one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Counter storage behind the limiter.
///
/// The in-memory implementation is process-local; a shared TTL cache can be
/// plugged in for multi-instance deployments.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key`, opening a new window ending at `now + window`
    /// when there is none or the previous one has elapsed
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> WindowCount;

    /// Current window for `key`, if one is open at `now`
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<WindowCount>;

    /// Drop every window that has elapsed at `now`; returns how many were dropped
    async fn expire(&self, now: DateTime<Utc>) -> usize;
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: RwLock<HashMap<String, WindowCount>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> WindowCount {
        let mut windows = self.windows.write().await;
        let entry = windows.entry(key.to_string()).or_insert(WindowCount {
            count: 0,
            reset_at: now + window,
        });

        if now >= entry.reset_at {
            *entry = WindowCount {
                count: 0,
                reset_at: now + window,
            };
        }
        entry.count = entry.count.saturating_add(1);

        *entry
    }

    async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<WindowCount> {
        self.windows
            .read()
            .await
            .get(key)
            .filter(|w| now < w.reset_at)
            .copied()
    }

    async fn expire(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| now < w.reset_at);
        before - windows.len()
    }
}

/// Outcome of one rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, at least 1
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("X-RateLimit-Limit", HeaderValue::from(self.limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(self.remaining));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(self.reset_at.timestamp()));
    }
}

/// Rate limiter state
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: std::time::Duration) -> Self {
        Self {
            store,
            max_requests,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    /// In-memory limiter
    pub fn in_memory(max_requests: u32, window: std::time::Duration) -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), max_requests, window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn check_and_consume(&self, identifier: &str) -> RateLimitDecision {
        self.check_and_consume_at(identifier, Utc::now()).await
    }

    pub async fn check_and_consume_at(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let current = self.store.increment(identifier, self.window, now).await;

        RateLimitDecision {
            allowed: current.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(current.count),
            reset_at: current.reset_at,
        }
    }

    /// Discard elapsed windows (call periodically)
    pub async fn sweep(&self) -> usize {
        self.store.expire(Utc::now()).await
    }
}

/// Rate limiting middleware, keyed by client IP
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client_key = client_ip(&request);
    let now = Utc::now();
    let decision = limiter.check_and_consume_at(&client_key, now).await;

    if !decision.allowed {
        tracing::warn!(client = %client_key, "Rate limit exceeded");
        let mut response = ApiError::TooManyRequests {
            retry_after_secs: decision.retry_after_secs(now),
        }
        .into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}

/// Client IP: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket address.
///
/// Forwarding headers are trusted as-is, so the server must sit behind a reverse
/// proxy that overwrites them. A client reaching it directly can set its own
/// `X-Forwarded-For` and get a fresh rate limit bucket per value.
pub fn client_ip(request: &Request) -> String {
    if let Some(ip) = header_value(request.headers(), "x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ip) = header_value(request.headers(), "x-real-ip")
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
