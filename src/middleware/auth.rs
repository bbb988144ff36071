//! JWT Authentication Middleware
//!
//! Validates bearer tokens on protected routes and resolves the subject to
//! an active user, which is injected into request extensions for handlers.
//!
//! Token validation is purely cryptographic; the account lookup that
//! follows is what enforces deactivation, since there is no server-side
//! revocation list. A deactivated account keeps a formally valid token
//! until expiry but fails the active check on every request.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{models::Role, utils::error::ErrorDetail, AppState};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration timestamp
    pub exp: i64,
}

/// Authenticated user resolved from a verified token
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

/// Extractor for CurrentUser from request extensions
///
/// Allows using CurrentUser as a handler parameter after the auth
/// middleware has run.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorDetail>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorDetail::new("Not authenticated")),
            )
        })
    }
}

fn parse_algorithm(name: &str) -> Algorithm {
    name.parse().unwrap_or(Algorithm::HS256)
}

/// Create a new access token for the given subject
pub fn create_access_token(
    subject: &Uuid,
    expire_minutes: i64,
    secret: &str,
    algorithm: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = Utc::now() + Duration::minutes(expire_minutes);
    let claims = Claims {
        sub: subject.to_string(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(parse_algorithm(algorithm)),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate and decode a token
///
/// Malformed encoding, bad signature, expired timestamp, and a missing
/// subject all collapse into `InvalidToken`; callers get no hint which
/// check failed.
pub fn validate_token(token: &str, secret: &str, algorithm: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(parse_algorithm(algorithm));
    validation.validate_exp = true;
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

/// Authentication error types
#[derive(Debug, PartialEq)]
pub enum AuthError {
    /// No Authorization header / no bearer token
    MissingToken,
    /// Token failed cryptographic validation (including expiry)
    InvalidToken,
    /// Verified subject has no matching user record
    UserNotFound,
    /// User exists but the account is deactivated
    InactiveUser,
    /// The principal store failed; identity faults block, never pass through
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            AuthError::InvalidToken => {
                (StatusCode::FORBIDDEN, "Could not validate credentials")
            }
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthError::InactiveUser => (StatusCode::BAD_REQUEST, "Inactive user"),
            AuthError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(ErrorDetail::new(detail))).into_response()
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
}

/// Authentication middleware
///
/// Extracts and validates the bearer token, resolves the subject against
/// the user store, and injects the CurrentUser into request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or(AuthError::MissingToken)?;

    let claims = validate_token(
        token,
        &state.config.auth.jwt_secret,
        &state.config.auth.algorithm,
    )?;

    let subject = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let user = state
        .users
        .get_by_id(&subject)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "User lookup failed during authentication");
            AuthError::Internal
        })?
        .ok_or(AuthError::UserNotFound)?;

    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
        is_active: user.is_active,
    });

    Ok(next.run(request).await)
}
