//! Configuration management
//!
//! YAML-based configuration with environment variable overrides and
//! defaults for every setting. The security section drives the abuse
//! detection and temporary-ban layer; its defaults match the values the
//! platform has always shipped with (5 violations, 15 minute ban, 5 minute
//! window).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://./data/lexportal.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_token_expire_minutes")]
    pub access_token_expire_minutes: i64,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_token_expire_minutes() -> i64 {
    480 // 8 hours
}

/// Abuse detection and temporary-ban configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Client identifiers that bypass all admission checks
    #[serde(default = "default_trusted_ips")]
    pub trusted_ips: Vec<String>,
    /// Violations within one window before a ban is issued
    #[serde(default = "default_max_violations")]
    pub max_violations: u64,
    /// Ban duration in seconds
    #[serde(default = "default_ban_seconds")]
    pub ban_seconds: u64,
    /// Violation counter window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Upper bound on a single admission-store round-trip, in milliseconds.
    /// A slower store is treated as unavailable and the request is admitted.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Path substrings that mark a request as a known scan attempt
    #[serde(default = "default_blacklisted_paths")]
    pub blacklisted_paths: Vec<String>,
    /// Query substrings that mark a request as an injection attempt
    #[serde(default = "default_sql_patterns")]
    pub sql_patterns: Vec<String>,
}

fn default_trusted_ips() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}

fn default_max_violations() -> u64 {
    5
}

fn default_ban_seconds() -> u64 {
    900 // 15 minutes
}

fn default_window_seconds() -> u64 {
    300 // 5 minutes
}

fn default_store_timeout_ms() -> u64 {
    250
}

fn default_blacklisted_paths() -> Vec<String> {
    [
        "/admin",
        "/phpmyadmin",
        "/.env",
        "/wp-admin",
        "/.git",
        "/config",
        "/backup",
        "/shell",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_sql_patterns() -> Vec<String> {
    [
        "union select",
        "drop table",
        "insert into",
        "delete from",
        "' or '1'='1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_ips: default_trusted_ips(),
            max_violations: default_max_violations(),
            ban_seconds: default_ban_seconds(),
            window_seconds: default_window_seconds(),
            store_timeout_ms: default_store_timeout_ms(),
            blacklisted_paths: default_blacklisted_paths(),
            sql_patterns: default_sql_patterns(),
        }
    }
}

/// Per-route-class rate limit quotas
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// General API quota per client, per minute
    #[serde(default = "default_api_per_minute")]
    pub api_per_minute: u32,
    #[serde(default = "default_api_burst")]
    pub api_burst: u32,
    /// Registration quota per client, per minute
    #[serde(default = "default_auth_per_minute")]
    pub auth_per_minute: u32,
    #[serde(default = "default_auth_burst")]
    pub auth_burst: u32,
}

fn default_api_per_minute() -> u32 {
    10
}

fn default_api_burst() -> u32 {
    20
}

fn default_auth_per_minute() -> u32 {
    3
}

fn default_auth_burst() -> u32 {
    3
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_per_minute: default_api_per_minute(),
            api_burst: default_api_burst(),
            auth_per_minute: default_auth_per_minute(),
            auth_burst: default_auth_burst(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                algorithm: default_algorithm(),
                access_token_expire_minutes: default_token_expire_minutes(),
            },
            security: SecurityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("LEXPORTAL_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = if let Some(ref path) = config_path {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_norway::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/lexportal/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("lexportal/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("LEXPORTAL_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LEXPORTAL_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LEXPORTAL_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(ips) = std::env::var("LEXPORTAL_TRUSTED_IPS") {
            self.security.trusted_ips =
                ips.split(',').map(|s| s.trim().to_string()).collect();
        }
    }

    /// Validate the loaded configuration
    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("auth.jwt_secret must not be empty");
        }
        if self.security.max_violations == 0 {
            anyhow::bail!("security.max_violations must be at least 1");
        }
        if self.security.window_seconds == 0 || self.security.ban_seconds == 0 {
            anyhow::bail!("security window and ban durations must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipped_values() {
        let config = AppConfig::default();
        assert_eq!(config.security.max_violations, 5);
        assert_eq!(config.security.ban_seconds, 900);
        assert_eq!(config.security.window_seconds, 300);
        assert_eq!(config.auth.access_token_expire_minutes, 480);
        assert!(config
            .security
            .trusted_ips
            .contains(&"127.0.0.1".to_string()));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
auth:
  jwt_secret: "test-secret-that-is-at-least-32-characters"
security:
  max_violations: 3
  ban_seconds: 60
"#;
        let config: AppConfig = serde_norway::from_str(yaml).unwrap();
        assert_eq!(config.security.max_violations, 3);
        assert_eq!(config.security.ban_seconds, 60);
        // Unspecified fields keep their defaults
        assert_eq!(config.security.window_seconds, 300);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_validate_rejects_zero_violations() {
        let mut config = AppConfig::default();
        config.security.max_violations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = String::new();
        assert!(config.validate().is_err());
    }
}
