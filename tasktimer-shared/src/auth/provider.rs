/// Auth collaborator contract and an in-process implementation
///
/// An [`AuthProvider`] knows who is signed in and pushes every change through a
/// `tokio::sync::watch` channel. [`IdentityResolver`](crate::identity::IdentityResolver)
/// follows that channel; nothing polls.
///
/// [`MemoryAuthProvider`] keeps accounts in process memory with Argon2 password
/// hashes and issues HS256 access tokens. It backs local mode and tests.
///
/// # Example
///
/// ```
/// use tasktimer_shared::auth::provider::{AuthProvider, MemoryAuthProvider};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let auth = MemoryAuthProvider::new("a-secret-key-that-is-at-least-32-bytes")?;
/// let mut changes = auth.subscribe();
///
/// let session = auth.sign_up("ada@example.com", "correct horse").await?;
/// changes.changed().await?;
/// assert_eq!(changes.borrow().as_ref().map(|u| u.id.clone()), Some(session.user.id));
/// # Ok(())
/// # }
/// ```

use super::jwt::{self, Claims, JwtError, MIN_SECRET_LEN};
use super::password::{self, PasswordError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

/// Signed-in user as reported by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user ID; scopes every repository operation
    pub id: String,

    /// Sign-in email
    pub email: String,
}

/// Result of a successful sign-up or sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// The user
    pub user: AuthUser,

    /// Bearer token for the API
    pub access_token: String,

    /// Token lifetime in seconds
    pub expires_in: i64,
}

/// Error type for auth operations
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Email already registered
    #[error("An account with email {0} already exists")]
    EmailTaken(String),

    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Password rejected by the sign-up rules
    #[error("{0}")]
    WeakPassword(String),

    /// Secret too short to sign tokens
    #[error("Auth secret must be at least 32 bytes")]
    WeakSecret,

    /// Hashing failure
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Token failure
    #[error(transparent)]
    Token(#[from] JwtError),
}

/// External authentication collaborator
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Currently signed-in user, if any
    fn current_user(&self) -> Option<AuthUser>;

    /// Registers an account and signs it in
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Signs in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Signs the current user out
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribes to auth-state changes
    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}

#[derive(Debug, Clone)]
struct Account {
    user: AuthUser,
    password_hash: String,
}

/// In-memory auth provider
pub struct MemoryAuthProvider {
    secret: String,
    accounts: RwLock<HashMap<String, Account>>,
    state: watch::Sender<Option<AuthUser>>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl MemoryAuthProvider {
    /// Creates a provider that signs tokens with `secret`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakSecret` if the secret is shorter than 32 bytes.
    pub fn new(secret: impl Into<String>) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::WeakSecret);
        }

        let (state, _) = watch::channel(None);

        Ok(Self {
            secret,
            accounts: RwLock::new(HashMap::new()),
            state,
        })
    }

    /// Creates an account without changing who is signed in
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        password::validate_password(password).map_err(AuthError::WeakPassword)?;

        let email = normalize_email(email);
        let password_hash = password::hash_password(password)?;

        let user = {
            let mut accounts = self.accounts.write().await;
            if accounts.contains_key(&email) {
                return Err(AuthError::EmailTaken(email));
            }

            let user = AuthUser {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.clone(),
            };
            accounts.insert(
                email,
                Account {
                    user: user.clone(),
                    password_hash,
                },
            );
            user
        };

        info!(user_id = %user.id, "Account registered");
        self.issue(user)
    }

    /// Checks credentials without changing who is signed in
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let account = {
            let accounts = self.accounts.read().await;
            accounts
                .get(&normalize_email(email))
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?
        };

        if !password::verify_password(password, &account.password_hash)? {
            debug!(user_id = %account.user.id, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue(account.user)
    }

    /// Validates an access token issued by this provider
    pub fn verify_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = jwt::validate_token(token, &self.secret)?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email.unwrap_or_default(),
        })
    }

    fn issue(&self, user: AuthUser) -> Result<AuthSession, AuthError> {
        let claims = Claims::new(user.id.clone(), Some(user.email.clone()));
        let access_token = jwt::create_token(&claims, &self.secret)?;

        Ok(AuthSession {
            user,
            access_token,
            expires_in: claims.exp - claims.iat,
        })
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let session = self.register(email, password).await?;
        self.state.send_replace(Some(session.user.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let session = self.authenticate(email, password).await?;
        self.state.send_replace(Some(session.user.clone()));
        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.state.send_replace(None) {
            info!(user_id = %user.id, "Signed out");
        }
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }
}
