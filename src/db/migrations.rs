//! Database schema setup
//!
//! Idempotent table creation, run on every startup.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'CLIENT',
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cases (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL DEFAULT 'OPEN',
        user_id TEXT NOT NULL REFERENCES users(id),
        created_at TEXT NOT NULL
    )
    "#,
    // Decaying violation counters, keyed by client identifier.
    // window_expires_at is unix milliseconds.
    r#"
    CREATE TABLE IF NOT EXISTS admission_violations (
        client_id TEXT PRIMARY KEY,
        count INTEGER NOT NULL,
        window_expires_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS admission_bans (
        client_id TEXT PRIMARY KEY,
        expires_at INTEGER NOT NULL
    )
    "#,
];

/// Apply the schema to the given pool
pub async fn run(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to apply database schema")?;
    }
    Ok(())
}
