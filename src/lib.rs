//! LexPortal API Library
//!
//! This crate provides the core functionality for the LexPortal legal
//! services backend: request admission control (abuse detection, temporary
//! bans, rate limiting), authentication, and the case API.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, Claims, CurrentUser};
use services::{CaseStore, UserStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database connection pool
    pub db: DbPool,
    /// User persistence
    pub users: UserStore,
    /// Case persistence
    pub cases: CaseStore,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        Self {
            config: Arc::new(config),
            users: UserStore::new(db.clone()),
            cases: CaseStore::new(db.clone()),
            db,
        }
    }
}
