//! Authentication endpoints
//!
//! Registration and OAuth2-style password login. Login re-issues a fresh
//! access token every time; there is no refresh flow.

use axum::{extract::State, Form, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::middleware::auth::create_access_token;
use crate::models::{UserCreate, UserPublic};
use crate::utils::error::{AppError, AppResult};
use crate::AppState;

/// Issued token response
#[derive(Debug, Serialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

/// OAuth2 password form (username field carries the email)
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Create a new user account
pub async fn register(
    State(state): State<AppState>,
    Json(user_in): Json<UserCreate>,
) -> AppResult<Json<UserPublic>> {
    let email = user_in.email.to_lowercase();

    if state.users.get_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest(
            "The user with this username already exists in the system.".to_string(),
        ));
    }

    let user = state.users.create(&email, &user_in.password).await?;
    info!(user = %user.id, "User registered");

    Ok(Json(user.into()))
}

/// OAuth2 compatible token login, get an access token for future requests
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<Token>> {
    let user = state.users.get_by_email(&form.username).await?;

    let user = match user {
        Some(user)
            if crate::services::UserStore::verify_password(
                &form.password,
                &user.password_hash,
            )? =>
        {
            user
        }
        _ => {
            return Err(AppError::BadRequest(
                "Incorrect email or password".to_string(),
            ))
        }
    };

    if !user.is_active {
        return Err(AppError::BadRequest("Inactive user".to_string()));
    }

    let access_token = create_access_token(
        &user.id,
        state.config.auth.access_token_expire_minutes,
        &state.config.auth.jwt_secret,
        &state.config.auth.algorithm,
    )
    .map_err(|e| AppError::Internal(format!("Failed to issue token: {}", e)))?;

    info!(user = %user.id, "User logged in");

    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
