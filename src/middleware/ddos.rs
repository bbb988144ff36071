//! DDoS protection middleware
//!
//! Admission control for every inbound request: known-scan and injection
//! detection, a decaying per-client violation counter, and temporary bans.
//! Runs ahead of routing, so banned clients are rejected no matter which
//! path they hit.
//!
//! Check order is load-bearing: whitelist, then ban, then pattern
//! detection, then violation accounting with ban promotion. The layer
//! fails open on any fault in its own store; one unprotected request is
//! preferable to an outage for every request, and identity checks further
//! down the chain still apply.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::services::AdmissionStore;
use crate::utils::error::ErrorDetail;

const BANNED_DETAIL: &str =
    "Your IP has been temporarily banned due to suspicious activity. Please try again later.";
const TOO_MANY_VIOLATIONS_DETAIL: &str =
    "Too many violations detected. Your IP has been temporarily banned.";

/// Shared state for the admission pipeline
#[derive(Clone)]
pub struct DdosState {
    store: Arc<dyn AdmissionStore>,
    security: Arc<SecurityConfig>,
    trusted: Arc<HashSet<String>>,
}

impl DdosState {
    pub fn new(store: Arc<dyn AdmissionStore>, security: SecurityConfig) -> Self {
        let trusted = security.trusted_ips.iter().cloned().collect();
        Self {
            store,
            security: Arc::new(security),
            trusted: Arc::new(trusted),
        }
    }

    fn violation_window(&self) -> Duration {
        Duration::from_secs(self.security.window_seconds)
    }

    fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.security.ban_seconds)
    }

    /// Run a store round-trip under the configured deadline. A timeout is an
    /// unavailable store, indistinguishable from any other store fault.
    async fn store_call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let deadline = Duration::from_millis(self.security.store_timeout_ms);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("admission store round-trip timed out")),
        }
    }
}

/// Extract the client identifier used for whitelist, violation, and ban
/// tracking.
///
/// Precedence: first X-Forwarded-For value, then X-Real-IP, then the
/// transport peer address, then "unknown". The order matters behind
/// proxies and must not change.
pub(crate) fn client_identifier(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Classify a request as suspicious from its path and query alone.
///
/// Pure function, no state: a path substring hit against the scan-target
/// list or an injection idiom in the query string is enough.
pub(crate) fn is_suspicious(path: &str, query: &str, security: &SecurityConfig) -> bool {
    let path = path.to_lowercase();
    if security
        .blacklisted_paths
        .iter()
        .any(|p| path.contains(p.as_str()))
    {
        return true;
    }

    let query = query.to_lowercase();
    security
        .sql_patterns
        .iter()
        .any(|p| query.contains(p.as_str()))
}

fn reject(detail: &str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorDetail::new(detail)),
    )
        .into_response()
}

/// Admission pipeline middleware
pub async fn ddos_protection_middleware(
    State(state): State<DdosState>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = client_identifier(&request);

    // Trusted clients bypass every following check
    if state.trusted.contains(&client_id) {
        return next.run(request).await;
    }

    match state.store_call(state.store.is_banned(&client_id)).await {
        Ok(true) => {
            debug!(client = %client_id, "Rejected banned client");
            return reject(BANNED_DETAIL);
        }
        Ok(false) => {}
        Err(e) => {
            // Fail open: never turn an admission-store fault into an outage
            warn!(client = %client_id, error = %e, "Admission store unavailable, admitting request");
            return next.run(request).await;
        }
    }

    let path = request.uri().path();
    let query = request.uri().query().unwrap_or("");

    if is_suspicious(path, query, &state.security) {
        let outcome = async {
            let count = state
                .store_call(
                    state
                        .store
                        .record_violation(&client_id, state.violation_window()),
                )
                .await?;
            if count >= state.security.max_violations {
                state
                    .store_call(state.store.ban(&client_id, state.ban_duration()))
                    .await?;
            }
            Ok::<u64, anyhow::Error>(count)
        }
        .await;

        match outcome {
            Ok(count) if count >= state.security.max_violations => {
                warn!(client = %client_id, violations = count, "Client banned after repeated violations");
                return reject(TOO_MANY_VIOLATIONS_DETAIL);
            }
            Ok(count) => {
                // Violation recorded, request still served
                debug!(client = %client_id, path = %path, violations = count, "Suspicious request admitted");
            }
            Err(e) => {
                warn!(client = %client_id, error = %e, "Admission store unavailable, admitting request");
            }
        }
    }

    next.run(request).await
}
