//! API routes and router assembly

pub mod auth;
pub mod cases;

use axum::{middleware::from_fn_with_state, routing::get, routing::post, Json, Router};
use serde_json::{json, Value};

use crate::middleware::{
    auth_middleware, ddos_protection_middleware, rate_limit_middleware, DdosState, RateLimitState,
    RouteQuota,
};
use crate::AppState;

async fn root() -> Json<Value> {
    Json(json!({
        "name": "LexPortal API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Build the application router with the full admission pipeline applied.
///
/// The DDoS protection layer is outermost and wraps the fallback too, so a
/// banned client is rejected even on paths that match no route.
pub fn router(state: AppState, ddos: DdosState, rate_limit: RateLimitState) -> Router {
    let auth_quota = RouteQuota::auth(&state.config.rate_limit);
    let api_quota = RouteQuota::api(&state.config.rate_limit);

    // Registration carries the strict quota; login is left to the abuse layer
    let rl_auth = rate_limit.clone();
    let auth_router = Router::new()
        .route("/register", post(auth::register))
        .layer(from_fn_with_state(rl_auth, move |s, req, next| {
            rate_limit_middleware(s, req, next, auth_quota)
        }))
        .route("/login", post(auth::login));

    let rl_api = rate_limit.clone();
    let cases_router = Router::new()
        .route("/", get(cases::read_cases).post(cases::create_case))
        .route("/{id}", get(cases::read_case))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn_with_state(rl_api, move |s, req, next| {
            rate_limit_middleware(s, req, next, api_quota)
        }));

    // Alias for the trailing-slash collection path: axum does no
    // trailing-slash redirects and the historical contract uses
    // `/api/v1/cases/`, so both forms must route to the handlers
    let rl_alias = rate_limit.clone();
    let cases_collection_alias = get(cases::read_cases)
        .post(cases::create_case)
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn_with_state(rl_alias, move |s, req, next| {
            rate_limit_middleware(s, req, next, api_quota)
        }));

    Router::new()
        .route("/", get(root))
        .nest("/api/v1/auth", auth_router)
        .nest("/api/v1/cases", cases_router)
        .route("/api/v1/cases/", cases_collection_alias)
        .layer(from_fn_with_state(ddos, ddos_protection_middleware))
        .with_state(state)
}
