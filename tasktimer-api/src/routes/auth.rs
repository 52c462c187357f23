/// Authentication endpoints
///
/// Available only when `AUTH_JWT_SECRET` is set; otherwise they answer 404 and
/// every request acts as "anonymous".
///
/// # Endpoints
///
/// - `POST /v1/auth/signup` - Create an account and get an access token
/// - `POST /v1/auth/signin` - Exchange credentials for an access token
///
/// # Response
///
/// ```json
/// {
///   "user": { "id": "uuid", "email": "user@example.com" },
///   "access_token": "eyJ...",
///   "expires_in": 3600
/// }
/// ```
///
/// Send the token as `Authorization: Bearer <access_token>`.

use crate::{
    app::AppState,
    error::{validate_request, ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;
use tasktimer_shared::auth::provider::{AuthSession, MemoryAuthProvider};
use validator::Validate;

/// Sign-up request
#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

/// Sign-in request
#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

fn provider(state: &AppState) -> ApiResult<&Arc<MemoryAuthProvider>> {
    state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Authentication is not enabled".to_string()))
}

/// Register a new account
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Invalid email or short password
/// - `409 Conflict`: Email already registered
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<(StatusCode, Json<AuthSession>)> {
    let auth = provider(&state)?;
    validate_request(&req)?;

    let session = auth.register(&req.email, &req.password).await?;

    tracing::info!(user_id = %session.user.id, "User signed up");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Sign in with email and password
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password
pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<Json<AuthSession>> {
    let auth = provider(&state)?;
    validate_request(&req)?;

    let session = auth.authenticate(&req.email, &req.password).await?;

    tracing::info!(user_id = %session.user.id, "User signed in");
    Ok(Json(session))
}
