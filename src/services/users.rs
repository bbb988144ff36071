//! User persistence and password handling
//!
//! Provides Argon2id password hashing and the principal lookups the
//! authentication middleware depends on.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::{Role, User};

/// User store backed by the application database
#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
}

impl UserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Hash a password using Argon2id
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(password_hash)
    }

    /// Verify a password against a stored hash
    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Get a user by ID
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, role, is_active, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by ID")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Get a user by email (lowercased before lookup)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, role, is_active, created_at FROM users WHERE email = ?",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Create a new user with the default role
    pub async fn create(&self, email: &str, password: &str) -> Result<User> {
        self.create_with_role(email, password, Role::Client).await
    }

    pub async fn create_with_role(&self, email: &str, password: &str, role: Role) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            password_hash: Self::hash_password(password)?,
            role,
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, role, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .bind(user.is_active)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        Ok(user)
    }

    /// Deactivate a user. Already-issued tokens stay valid until natural
    /// expiry; the per-request active check is what locks the account out.
    pub async fn set_active(&self, id: &Uuid, active: bool) -> Result<()> {
        sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update user active flag")?;
        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id_str: String = row.get("id");
    let role_str: String = row.get("role");
    let created_at_str: String = row.get("created_at");

    Ok(User {
        id: Uuid::parse_str(&id_str).context("Invalid user ID in database")?,
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role_str
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
        is_active: row.get("is_active"),
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid timestamp in database")?
            .with_timezone(&Utc),
    })
}
