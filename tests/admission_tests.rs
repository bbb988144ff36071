//! End-to-end admission pipeline tests
//!
//! Drives the full router (DDoS protection, rate limiting, authentication,
//! ownership checks) through tower's oneshot without binding a socket.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use lexportal::config::{AppConfig, RateLimitConfig};
use lexportal::middleware::auth::create_access_token;
use lexportal::middleware::{DdosState, RateLimitState};
use lexportal::models::Role;
use lexportal::services::{AdmissionStore, MemoryAdmissionStore};
use lexportal::{api, AppState};

const TEST_SECRET: &str = "integration-test-secret-at-least-32-characters";

/// Store whose every operation fails, for fail-open coverage
struct FailingStore;

#[async_trait]
impl AdmissionStore for FailingStore {
    async fn record_violation(&self, _client_id: &str, _window: Duration) -> Result<u64> {
        anyhow::bail!("store down")
    }

    async fn violations(&self, _client_id: &str) -> Result<u64> {
        anyhow::bail!("store down")
    }

    async fn ban(&self, _client_id: &str, _duration: Duration) -> Result<()> {
        anyhow::bail!("store down")
    }

    async fn is_banned(&self, _client_id: &str) -> Result<bool> {
        anyhow::bail!("store down")
    }

    async fn cleanup(&self) -> Result<()> {
        anyhow::bail!("store down")
    }
}

async fn build_app(store: Arc<dyn AdmissionStore>) -> (Router, AppState) {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    lexportal::db::migrations::run(&pool).await.unwrap();

    let mut config = AppConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    // Generous API quota so only the admission layer decides these tests
    config.rate_limit = RateLimitConfig {
        api_per_minute: 1000,
        api_burst: 1000,
        auth_per_minute: 3,
        auth_burst: 3,
    };

    let security = config.security.clone();
    let state = AppState::new(config, pool);
    let ddos = DdosState::new(store, security);
    let app = api::router(state.clone(), ddos, RateLimitState::new());

    (app, state)
}

async fn default_app() -> (Router, AppState) {
    build_app(Arc::new(MemoryAdmissionStore::new())).await
}

fn get(uri: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Forwarded-For", client_ip)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn register(app: &Router, ip: &str, email: &str) -> axum::response::Response {
    let body = json!({"email": email, "password": "pw12345678"}).to_string();
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/register")
                .header("content-type", "application/json")
                .header("X-Forwarded-For", ip)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn login(app: &Router, ip: &str, email: &str, password: &str) -> axum::response::Response {
    let body = format!("username={}&password={}", email, password);
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/x-www-form-urlencoded")
                .header("X-Forwarded-For", ip)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn bearer_get(uri: &str, ip: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-Forwarded-For", ip)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_repeated_scan_attempts_lead_to_ban() {
    let (app, _) = default_app().await;
    let ip = "1.2.3.4";

    // Four violations: suspicious requests are still served (routed, 404)
    for i in 1..=4 {
        let response = app.clone().oneshot(get("/.env", ip)).await.unwrap();
        assert_eq!(
            response.status(),
            StatusCode::NOT_FOUND,
            "request {} should still be admitted",
            i
        );
    }

    // Fifth violation crosses the threshold and trips the ban
    let response = app.clone().oneshot(get("/.env", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .contains("Too many violations"));

    // Once banned, even a perfectly valid route is rejected
    let response = app.clone().oneshot(get("/", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("banned"));
}

#[tokio::test]
async fn test_trusted_client_is_never_banned() {
    let (app, _) = default_app().await;
    let ip = "127.0.0.1";

    for _ in 0..10 {
        let response = app.clone().oneshot(get("/phpmyadmin", ip)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app.clone().oneshot(get("/", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_single_violation_is_still_admitted() {
    let (app, _) = default_app().await;
    let ip = "198.51.100.9";

    let response = app.clone().oneshot(get("/.env", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_failure_fails_open() {
    let (app, _) = build_app(Arc::new(FailingStore)).await;
    let ip = "203.0.113.50";

    // Nothing from the admission layer surfaces as an error
    let response = app.clone().oneshot(get("/.env", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_registration_rate_limit() {
    let (app, _) = default_app().await;
    let ip = "203.0.113.80";

    for i in 0..3 {
        let response = register(&app, ip, &format!("user{}@example.com", i)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = register(&app, ip, "user4@example.com").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Another client still has its own quota
    let response = register(&app, "203.0.113.81", "user5@example.com").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_and_case_ownership_flow() {
    let (app, state) = default_app().await;
    let ip = "203.0.113.10";

    assert_eq!(
        register(&app, ip, "alice@example.com").await.status(),
        StatusCode::OK
    );
    assert_eq!(
        register(&app, ip, "bob@example.com").await.status(),
        StatusCode::OK
    );

    let response = login(&app, ip, "alice@example.com", "pw12345678").await;
    assert_eq!(response.status(), StatusCode::OK);
    let alice_token = body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = login(&app, ip, "bob@example.com", "pw12345678").await;
    let bob_token = body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    // Alice creates a case
    let body = json!({"title": "Contract dispute", "description": "details"}).to_string();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/cases/")
                .header("content-type", "application/json")
                .header("X-Forwarded-For", ip)
                .header("Authorization", format!("Bearer {}", alice_token))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let case_id = body_json(response).await["id"].as_str().unwrap().to_string();

    // Alice reads it back
    let uri = format!("/api/v1/cases/{}", case_id);
    let response = app
        .clone()
        .oneshot(bearer_get(&uri, ip, &alice_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Bob is denied with the historical 400 contract
    let response = app
        .clone()
        .oneshot(bearer_get(&uri, ip, &bob_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Not enough permissions");

    // An admin can read anyone's case
    let admin = state
        .users
        .create_with_role("admin@example.com", "pw12345678", Role::Admin)
        .await
        .unwrap();
    let admin_token =
        create_access_token(&admin.id, 480, TEST_SECRET, "HS256").unwrap();
    let response = app
        .clone()
        .oneshot(bearer_get(&uri, ip, &admin_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Bob lists only his own cases: none
    let response = app
        .clone()
        .oneshot(bearer_get("/api/v1/cases/", ip, &bob_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_credential_rejections_are_distinguishable() {
    let (app, state) = default_app().await;
    let ip = "203.0.113.20";

    // No credentials at all
    let response = app
        .clone()
        .oneshot(get("/api/v1/cases/", ip))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unverifiable token
    let response = app
        .clone()
        .oneshot(bearer_get("/api/v1/cases/", ip, "garbage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Could not validate credentials");

    // Valid token for a nonexistent principal
    let ghost_token =
        create_access_token(&Uuid::new_v4(), 480, TEST_SECRET, "HS256").unwrap();
    let response = app
        .clone()
        .oneshot(bearer_get("/api/v1/cases/", ip, &ghost_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Deactivated principal with a still-valid token
    let user = state
        .users
        .create("carol@example.com", "pw12345678")
        .await
        .unwrap();
    let token = create_access_token(&user.id, 480, TEST_SECRET, "HS256").unwrap();
    state.users.set_active(&user.id, false).await.unwrap();

    let response = app
        .clone()
        .oneshot(bearer_get("/api/v1/cases/", ip, &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Inactive user");
}

#[tokio::test]
async fn test_scan_attempts_accumulate_across_paths() {
    let (app, _) = default_app().await;
    let ip = "233.252.0.77";

    // Scan attempts against different paths count against one identifier
    let suspicious = [
        "/.env",
        "/wp-admin/setup.php",
        "/config/app.yml",
        "/.git/config",
        "/backup.zip",
    ];
    let mut saw_ban = false;
    for uri in suspicious {
        let response = app.clone().oneshot(get(uri, ip)).await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            saw_ban = true;
        }
    }
    assert!(saw_ban, "fifth violation should trip the ban");

    let response = app.clone().oneshot(get("/", ip)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
