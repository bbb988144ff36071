//! Database layer
//!
//! Local SQLite storage for user accounts, cases, and the shared
//! admission-control counters. The same pool backs the principal store and
//! the violation/ban store so a multi-process deployment pointing at one
//! database file shares ban state.

pub mod migrations;

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Pool, Sqlite};

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and apply the schema
pub async fn init_pool(url: &str, max_connections: u32) -> Result<DbPool> {
    let options: SqliteConnectOptions = url
        .parse::<SqliteConnectOptions>()
        .with_context(|| format!("Invalid database URL: {}", url))?
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database: {}", url))?;

    migrations::run(&pool).await?;

    Ok(pool)
}
