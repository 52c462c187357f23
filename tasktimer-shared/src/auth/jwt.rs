/// Access token generation and validation
///
/// Access tokens are HS256 JWTs whose `sub` claim is the user ID that every
/// repository operation is scoped to. The API server validates them per request;
/// [`MemoryAuthProvider`](super::provider::MemoryAuthProvider) issues them on sign-in.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Expiration**: 1 hour by default
/// - **Validation**: signature, expiration, issuer and audience
///
/// # Example
///
/// ```
/// use tasktimer_shared::auth::jwt::{create_token, validate_token, Claims};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-secret-key-that-is-at-least-32-bytes";
/// let claims = Claims::new("user-123", Some("ada@example.com".to_string()));
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_token(&token, secret)?;
/// assert_eq!(validated.sub, "user-123");
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Issuer written into and required from every token
pub const ISSUER: &str = "tasktimer";

/// Audience of tokens that act on behalf of a signed-in user
pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// Minimum secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, issuer, audience or format check failed
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,
}

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: String,

    /// Issuer - always "tasktimer"
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Email of the signed-in user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Creates claims valid for one hour
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self::with_expiration(user_id, email, Duration::hours(1))
    }

    /// Creates claims with a custom lifetime
    pub fn with_expiration(user_id: impl Into<String>, email: Option<String>, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id.into(),
            iss: ISSUER.to_string(),
            aud: DEFAULT_AUDIENCE.to_string(),
            email,
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        }
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims into a token
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a token and extracts its claims
///
/// # Errors
///
/// - `JwtError::Expired` if the token is past its expiration
/// - `JwtError::ValidationError` for a bad signature, issuer, audience or format
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_audience(&[DEFAULT_AUDIENCE]);
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}
