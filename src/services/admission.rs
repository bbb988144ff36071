//! Violation tracking and temporary bans
//!
//! Shared mutable state behind the admission pipeline: a decaying
//! per-client violation counter and a self-expiring ban set. Both live
//! behind the [`AdmissionStore`] trait with two implementations:
//!
//! - [`DbAdmissionStore`] keeps counters in the application database so
//!   every serving instance pointing at the same database observes the
//!   same bans.
//! - [`MemoryAdmissionStore`] is the in-process fallback. Its state is
//!   instance-local, so across a multi-instance deployment bans are only
//!   eventually consistent. This is a known limitation of running without
//!   a shared store.
//!
//! Window semantics are identical either way: the first violation opens a
//! window of the configured length; further violations within the window
//! increment the counter without extending it; once the window lapses the
//! counter reads as zero and the next violation starts a fresh window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::warn;

use crate::db::DbPool;

/// Counter and ban operations used by the admission pipeline
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Record one violation for the client and return the count now
    /// standing against it. Increments must be atomic: concurrent calls
    /// for the same client may not lose updates.
    async fn record_violation(&self, client_id: &str, window: Duration) -> Result<u64>;

    /// Current violation count, 0 if absent or the window has lapsed
    async fn violations(&self, client_id: &str) -> Result<u64>;

    /// Ban the client until now + duration, replacing any existing ban
    async fn ban(&self, client_id: &str, duration: Duration) -> Result<()>;

    /// Whether an unexpired ban exists. Expired bans read as absent
    /// without requiring a cleanup pass.
    async fn is_banned(&self, client_id: &str) -> Result<bool>;

    /// Drop lapsed violation windows and expired bans. Client identifiers
    /// come from request headers, so the key space is attacker-controlled
    /// and grows without bound unless pruned. Reads already ignore expired
    /// entries; this only reclaims space.
    async fn cleanup(&self) -> Result<()>;
}

/// Spawn a background task to periodically prune expired store entries
pub fn spawn_admission_cleanup(store: Arc<dyn AdmissionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Every hour
        loop {
            interval.tick().await;
            if let Err(e) = store.cleanup().await {
                warn!(error = %e, "Admission store cleanup failed");
            }
        }
    });
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Database-backed store
// ---------------------------------------------------------------------------

/// Admission store backed by the application database
#[derive(Clone)]
pub struct DbAdmissionStore {
    pool: DbPool,
}

impl DbAdmissionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdmissionStore for DbAdmissionStore {
    async fn record_violation(&self, client_id: &str, window: Duration) -> Result<u64> {
        let now = now_millis();
        let new_expiry = now + duration_millis(window);

        // Single upsert so concurrent increments for one client serialize
        // inside the database instead of racing a read-modify-write here.
        // A lapsed window resets the counter; a live one keeps its expiry.
        let row = sqlx::query(
            r#"
            INSERT INTO admission_violations (client_id, count, window_expires_at)
            VALUES (?, 1, ?)
            ON CONFLICT(client_id) DO UPDATE SET
                count = CASE
                    WHEN admission_violations.window_expires_at <= ? THEN 1
                    ELSE admission_violations.count + 1
                END,
                window_expires_at = CASE
                    WHEN admission_violations.window_expires_at <= ? THEN ?
                    ELSE admission_violations.window_expires_at
                END
            RETURNING count
            "#,
        )
        .bind(client_id)
        .bind(new_expiry)
        .bind(now)
        .bind(now)
        .bind(new_expiry)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record violation")?;

        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    async fn violations(&self, client_id: &str) -> Result<u64> {
        let row = sqlx::query(
            "SELECT count FROM admission_violations WHERE client_id = ? AND window_expires_at > ?",
        )
        .bind(client_id)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read violation count")?;

        Ok(row
            .map(|r| r.get::<i64, _>("count").max(0) as u64)
            .unwrap_or(0))
    }

    async fn ban(&self, client_id: &str, duration: Duration) -> Result<()> {
        let expires_at = now_millis() + duration_millis(duration);

        sqlx::query(
            r#"
            INSERT INTO admission_bans (client_id, expires_at)
            VALUES (?, ?)
            ON CONFLICT(client_id) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(client_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to record ban")?;

        Ok(())
    }

    async fn is_banned(&self, client_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 AS active FROM admission_bans WHERE client_id = ? AND expires_at > ?",
        )
        .bind(client_id)
        .bind(now_millis())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read ban state")?;

        Ok(row.is_some())
    }

    async fn cleanup(&self) -> Result<()> {
        let now = now_millis();

        sqlx::query("DELETE FROM admission_violations WHERE window_expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to prune lapsed violations")?;

        sqlx::query("DELETE FROM admission_bans WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .context("Failed to prune expired bans")?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory fallback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct ViolationEntry {
    count: u64,
    window_expires_at: i64,
}

/// In-process admission store for single-instance deployments
#[derive(Default)]
pub struct MemoryAdmissionStore {
    violations: Mutex<HashMap<String, ViolationEntry>>,
    bans: Mutex<HashMap<String, i64>>,
}

impl MemoryAdmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdmissionStore for MemoryAdmissionStore {
    async fn record_violation(&self, client_id: &str, window: Duration) -> Result<u64> {
        let now = now_millis();
        let mut violations = self.violations.lock().await;

        let entry = violations
            .entry(client_id.to_string())
            .and_modify(|e| {
                if e.window_expires_at <= now {
                    e.count = 1;
                    e.window_expires_at = now + duration_millis(window);
                } else {
                    e.count += 1;
                }
            })
            .or_insert(ViolationEntry {
                count: 1,
                window_expires_at: now + duration_millis(window),
            });

        Ok(entry.count)
    }

    async fn violations(&self, client_id: &str) -> Result<u64> {
        let now = now_millis();
        let violations = self.violations.lock().await;
        Ok(violations
            .get(client_id)
            .filter(|e| e.window_expires_at > now)
            .map(|e| e.count)
            .unwrap_or(0))
    }

    async fn ban(&self, client_id: &str, duration: Duration) -> Result<()> {
        let expires_at = now_millis() + duration_millis(duration);
        let mut bans = self.bans.lock().await;
        bans.insert(client_id.to_string(), expires_at);
        Ok(())
    }

    async fn is_banned(&self, client_id: &str) -> Result<bool> {
        let now = now_millis();
        let mut bans = self.bans.lock().await;
        match bans.get(client_id) {
            Some(&expires_at) if expires_at > now => Ok(true),
            Some(_) => {
                // Lapsed entry, drop it on the way out
                bans.remove(client_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn cleanup(&self) -> Result<()> {
        let now = now_millis();
        self.violations
            .lock()
            .await
            .retain(|_, e| e.window_expires_at > now);
        self.bans.lock().await.retain(|_, expires_at| *expires_at > now);
        Ok(())
    }
}
