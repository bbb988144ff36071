//! LexPortal API server
//!
//! Backend for the LexPortal legal services platform. Wires the admission
//! pipeline (abuse detection, temporary bans, rate limiting) around the
//! authenticated case API and serves it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexportal::config::LogFormat;
use lexportal::middleware::{spawn_rate_limit_cleanup, DdosState, RateLimitState};
use lexportal::services::{spawn_admission_cleanup, DbAdmissionStore};
use lexportal::{api, db, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_logging(&config);

    info!("LexPortal API starting up");

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let pool = db::init_pool(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to initialize database")?;

    // The admission counters share the application database so every
    // instance pointing at it observes the same bans.
    let admission_store = Arc::new(DbAdmissionStore::new(pool.clone()));
    let ddos = DdosState::new(admission_store.clone(), config.security.clone());
    let rate_limit = RateLimitState::new();

    // Expired counters, bans, and idle limiters are pruned in the background
    spawn_admission_cleanup(admission_store);
    spawn_rate_limit_cleanup(rate_limit.clone());

    let cors = build_cors_layer(&config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState::new(config, pool);
    let app = api::router(state, ddos, rate_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind server address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Create the data directory for a file-backed SQLite URL if needed
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create data directory {:?}", parent))?;
                }
            }
        }
    }
    Ok(())
}
