/// Authentication primitives
///
/// # Modules
///
/// - [`provider`]: the auth collaborator contract and an in-process implementation
/// - [`jwt`]: HS256 access tokens carrying the user ID
/// - [`password`]: Argon2id password hashing
///
/// # Example
///
/// ```no_run
/// use tasktimer_shared::auth::jwt::{create_token, validate_token, Claims};
/// use tasktimer_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let token = create_token(&Claims::new("user-id", None), "a-secret-key-that-is-at-least-32-bytes")?;
/// let claims = validate_token(&token, "a-secret-key-that-is-at-least-32-bytes")?;
/// assert_eq!(claims.sub, "user-id");
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod password;
pub mod provider;
