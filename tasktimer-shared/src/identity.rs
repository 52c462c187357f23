/// Acting-user resolution
///
/// Every task and interruption operation is scoped to a user ID. The ID comes from
/// the auth collaborator when someone is signed in and falls back to the literal
/// `"anonymous"` otherwise. Resolution never fails.
///
/// The resolver follows the provider's `watch` channel, so the answer changes as
/// soon as the provider reports a sign-in or sign-out, without polling.
///
/// # Example
///
/// ```
/// use tasktimer_shared::auth::provider::{AuthProvider, MemoryAuthProvider};
/// use tasktimer_shared::identity::{IdentityResolver, ANONYMOUS_USER_ID};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let auth = MemoryAuthProvider::new("a-secret-key-that-is-at-least-32-bytes")?;
/// let identity = IdentityResolver::from_provider(&auth);
/// assert_eq!(identity.user_id(), ANONYMOUS_USER_ID);
///
/// let session = auth.sign_up("ada@example.com", "correct horse").await?;
/// assert_eq!(identity.user_id(), session.user.id);
/// # Ok(())
/// # }
/// ```

use crate::auth::provider::{AuthProvider, AuthUser};
use tokio::sync::watch;
use tracing::debug;

/// User ID used when nobody is signed in
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Maps an optional authenticated ID onto the acting user ID
pub fn resolve_user_id(authenticated: Option<&str>) -> String {
    authenticated
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(ANONYMOUS_USER_ID)
        .to_string()
}

/// Resolves the acting user from an auth collaborator
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    state: Option<watch::Receiver<Option<AuthUser>>>,
}

impl IdentityResolver {
    /// Resolver without an auth collaborator; always anonymous
    pub fn anonymous() -> Self {
        Self { state: None }
    }

    /// Resolver following a provider's auth-state changes
    pub fn from_provider(provider: &dyn AuthProvider) -> Self {
        Self {
            state: Some(provider.subscribe()),
        }
    }

    /// Currently signed-in user, if any
    pub fn current_user(&self) -> Option<AuthUser> {
        self.state.as_ref().and_then(|rx| rx.borrow().clone())
    }

    /// Acting user ID
    pub fn user_id(&self) -> String {
        resolve_user_id(self.current_user().as_ref().map(|u| u.id.as_str()))
    }

    /// Whether a user is signed in
    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// Waits for the next auth-state change and returns the new acting user ID
    ///
    /// Returns `None` when there is nothing to wait for: the resolver is anonymous
    /// or the provider has been dropped.
    pub async fn changed(&mut self) -> Option<String> {
        let rx = self.state.as_mut()?;

        if rx.changed().await.is_err() {
            debug!("Auth provider dropped, identity is now fixed");
            return None;
        }

        Some(self.user_id())
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::anonymous()
    }
}
