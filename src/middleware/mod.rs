//! Middleware components
//!
//! Request-path layers, outermost first:
//! - Abuse detection and temporary bans (admission pipeline)
//! - Rate limiting
//! - Authentication (JWT) and identity resolution

pub mod auth;
pub mod ddos;
pub mod rate_limit;

pub use auth::{auth_middleware, Claims, CurrentUser};
pub use ddos::{ddos_protection_middleware, DdosState};
pub use rate_limit::{
    rate_limit_middleware, spawn_rate_limit_cleanup, RateLimitState, RouteQuota,
};
