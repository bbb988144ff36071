//! Case endpoints
//!
//! Every resource-scoped operation goes through the same ownership gate
//! (`services::ownership::authorize_owner`); admins see everything, other
//! roles only their own cases.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::models::{Case, CaseCreate, Role};
use crate::services::ownership::authorize_owner;
use crate::utils::error::{AppError, AppResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Retrieve cases
pub async fn read_cases(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Case>>> {
    let cases = if user.role == Role::Admin {
        state.cases.list_all(page.limit, page.skip).await?
    } else {
        state
            .cases
            .list_for_user(&user.id, page.limit, page.skip)
            .await?
    };

    Ok(Json(cases))
}

/// Create new case
pub async fn create_case(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(case_in): Json<CaseCreate>,
) -> AppResult<Json<Case>> {
    let case = state.cases.create(&user.id, &case_in).await?;
    Ok(Json(case))
}

/// Get case by ID
pub async fn read_case(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Case>> {
    let case = state
        .cases
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound("Case not found".to_string()))?;

    authorize_owner(&user, case.user_id)?;

    Ok(Json(case))
}
