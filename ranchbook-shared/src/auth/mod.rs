/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: Access/refresh token issuance and validation
/// - [`middleware`]: The request principal and bearer-token extraction
/// - [`authorization`]: The farm-membership guard every scoped operation runs
///
/// # Example
///
/// ```no_run
/// use ranchbook_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let claims = Claims::new(Uuid::new_v4(), "ana@example.com", None, TokenType::Access);
/// let token = create_token(&claims, "secret-key")?;
/// let validated = validate_access_token(&token, "secret-key")?;
/// assert_eq!(validated.email, "ana@example.com");
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
