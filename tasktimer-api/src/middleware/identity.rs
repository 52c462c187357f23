/// Per-request identity resolution
///
/// Resolves the acting user of every `/v1` request and stores it as an
/// [`Identity`] request extension:
///
/// - no `Authorization` header: the server's default identity (`"anonymous"`)
/// - `Authorization: Bearer <token>`: the token's subject, if the token verifies
///
/// A header that is not a bearer token, or a token that fails verification, is
/// rejected with 401. Tokens are only accepted when `AUTH_JWT_SECRET` is set.

use crate::{app::AppState, error::ApiError};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tasktimer_shared::identity::resolve_user_id;

/// Acting user of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// User ID every repository call is scoped to
    pub user_id: String,

    /// Whether the ID came from a verified token
    pub authenticated: bool,
}

/// Identity middleware layer
pub async fn identity_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve(&state, &req)?;

    tracing::debug!(
        user_id = %identity.user_id,
        authenticated = identity.authenticated,
        "Request identity resolved"
    );

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn resolve(state: &AppState, req: &Request) -> Result<Identity, ApiError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(Identity {
            user_id: state.identity.user_id(),
            authenticated: false,
        });
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Expected Bearer token".to_string()))?;

    let auth = state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::Unauthorized("Bearer tokens are not enabled".to_string()))?;

    let user = auth.verify_token(token)?;

    Ok(Identity {
        user_id: resolve_user_id(Some(&user.id)),
        authenticated: true,
    })
}
