//! Case persistence
//!
//! Thin CRUD over the cases table. Access control lives in the handlers
//! via the ownership gate, not here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{Case, CaseCreate};

#[derive(Clone)]
pub struct CaseStore {
    pool: DbPool,
}

impl CaseStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List all cases (admin view)
    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Case>> {
        let rows = sqlx::query(
            "SELECT id, title, description, status, user_id, created_at FROM cases ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cases")?;

        rows.iter().map(row_to_case).collect()
    }

    /// List cases owned by a user
    pub async fn list_for_user(&self, user_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Case>> {
        let rows = sqlx::query(
            "SELECT id, title, description, status, user_id, created_at FROM cases WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cases for user")?;

        rows.iter().map(row_to_case).collect()
    }

    /// Get a case by ID
    pub async fn get(&self, id: &Uuid) -> Result<Option<Case>> {
        let row = sqlx::query(
            "SELECT id, title, description, status, user_id, created_at FROM cases WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch case")?;

        row.as_ref().map(row_to_case).transpose()
    }

    /// Create a case owned by the given user
    pub async fn create(&self, owner: &Uuid, input: &CaseCreate) -> Result<Case> {
        let case = Case {
            id: Uuid::new_v4(),
            title: input.title.clone(),
            description: input.description.clone(),
            status: "OPEN".to_string(),
            user_id: *owner,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO cases (id, title, description, status, user_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(case.id.to_string())
        .bind(&case.title)
        .bind(&case.description)
        .bind(&case.status)
        .bind(case.user_id.to_string())
        .bind(case.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to create case")?;

        Ok(case)
    }
}

fn row_to_case(row: &sqlx::sqlite::SqliteRow) -> Result<Case> {
    let id_str: String = row.get("id");
    let user_id_str: String = row.get("user_id");
    let created_at_str: String = row.get("created_at");

    Ok(Case {
        id: Uuid::parse_str(&id_str).context("Invalid case ID in database")?,
        title: row.get("title"),
        description: row.get("description"),
        status: row.get("status"),
        user_id: Uuid::parse_str(&user_id_str).context("Invalid owner ID in database")?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid timestamp in database")?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::UserStore;

    async fn stores() -> (UserStore, CaseStore) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrations::run(&pool).await.unwrap();
        (UserStore::new(pool.clone()), CaseStore::new(pool))
    }

    #[tokio::test]
    async fn test_create_and_scope_by_owner() {
        let (users, cases) = stores().await;
        let alice = users.create("alice@example.com", "pw12345678").await.unwrap();
        let bob = users.create("bob@example.com", "pw12345678").await.unwrap();

        let input = CaseCreate {
            title: "Contract dispute".into(),
            description: Some("Details".into()),
        };
        let case = cases.create(&alice.id, &input).await.unwrap();
        assert_eq!(case.status, "OPEN");
        assert_eq!(case.user_id, alice.id);

        assert_eq!(cases.list_for_user(&alice.id, 100, 0).await.unwrap().len(), 1);
        assert_eq!(cases.list_for_user(&bob.id, 100, 0).await.unwrap().len(), 0);
        assert_eq!(cases.list_all(100, 0).await.unwrap().len(), 1);

        let fetched = cases.get(&case.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Contract dispute");
    }
}
