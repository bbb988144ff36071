//! Rate limiting middleware
//!
//! Per-(route class, client) quotas using the governor crate. This layer
//! is independent of the DDoS protection middleware: the two run on the
//! same request path but share no state, and exhausting a quota never
//! counts as a violation.

use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::middleware::ddos::client_identifier;
use crate::utils::error::ErrorDetail;

/// Quota attached to a route class
#[derive(Debug, Clone, Copy)]
pub struct RouteQuota {
    pub key: &'static str,
    pub per_minute: u32,
    pub burst: u32,
}

impl RouteQuota {
    /// General API quota
    pub fn api(config: &RateLimitConfig) -> Self {
        Self {
            key: "api",
            per_minute: config.api_per_minute,
            burst: config.api_burst,
        }
    }

    /// Stricter quota for registration
    pub fn auth(config: &RateLimitConfig) -> Self {
        Self {
            key: "auth",
            per_minute: config.auth_per_minute,
            burst: config.auth_burst,
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Thread-safe map of (route class, client) pairs to their limiters
#[derive(Clone, Default)]
pub struct RateLimitState {
    limiters: Arc<RwLock<HashMap<(String, String), Arc<DirectLimiter>>>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the quota for one (route class, client) pair
    pub async fn allow(&self, quota: &RouteQuota, client_id: &str) -> bool {
        let limiter = self.get_limiter(quota, client_id).await;
        limiter.check().is_ok()
    }

    async fn get_limiter(&self, quota: &RouteQuota, client_id: &str) -> Arc<DirectLimiter> {
        let key = (quota.key.to_string(), client_id.to_string());

        {
            let limiters = self.limiters.read().await;
            if let Some(limiter) = limiters.get(&key) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().await;
        // Double-check after acquiring the write lock
        if let Some(limiter) = limiters.get(&key) {
            return limiter.clone();
        }

        let q = Quota::per_minute(NonZeroU32::new(quota.per_minute).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(quota.burst).unwrap_or(NonZeroU32::MIN));
        let limiter = Arc::new(RateLimiter::direct(q));
        limiters.insert(key, limiter.clone());
        limiter
    }

    /// Number of (route class, client) pairs currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.limiters.read().await.len()
    }

    /// Cap the limiter map to prevent memory exhaustion.
    ///
    /// Client identifiers come from request headers, so one sender can mint
    /// an arbitrary number of them. Should be called periodically.
    pub async fn cleanup(&self) {
        let mut limiters = self.limiters.write().await;
        let initial_count = limiters.len();

        const MAX_TRACKED_CLIENTS: usize = 10_000;

        if limiters.len() > MAX_TRACKED_CLIENTS {
            // governor limiters carry no idle timestamp, so drop half
            let to_remove: Vec<_> = limiters
                .keys()
                .take(limiters.len() / 2)
                .cloned()
                .collect();
            for key in to_remove {
                limiters.remove(&key);
            }

            debug!(
                "Rate limiter cleanup: {} -> {} entries",
                initial_count,
                limiters.len()
            );
        }
    }
}

/// Spawn a background task to periodically prune the limiter map
pub fn spawn_rate_limit_cleanup(state: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Every hour
        loop {
            interval.tick().await;
            state.cleanup().await;
        }
    });
}

/// Rate limiting middleware
///
/// Wire per route class with a closure capturing the quota:
/// ```ignore
/// let quota = RouteQuota::auth(&config.rate_limit);
/// router.layer(axum::middleware::from_fn_with_state(
///     rate_limit.clone(),
///     move |state, req, next| rate_limit_middleware(state, req, next, quota),
/// ));
/// ```
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
    quota: RouteQuota,
) -> Response {
    let client_id = client_identifier(&request);

    if state.allow(&quota, &client_id).await {
        debug!(client = %client_id, route = quota.key, "Rate limit check passed");
        next.run(request).await
    } else {
        warn!(client = %client_id, route = quota.key, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", "60")],
            Json(ErrorDetail::new(format!(
                "Rate limit exceeded: {} per 1 minute",
                quota.per_minute
            ))),
        )
            .into_response()
    }
}
