//! Case model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Legal case entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    /// Owning user; resource-scoped access checks compare against this
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Case creation payload
#[derive(Debug, Clone, Deserialize)]
pub struct CaseCreate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}
