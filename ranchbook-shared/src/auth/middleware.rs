/// Request principal and bearer-token authentication
///
/// The authentication middleware turns a valid `Authorization: Bearer <jwt>`
/// header into a [`Principal`] stored in the request extensions. Handlers
/// extract it with `Extension<Principal>` and pass it explicitly into every
/// scoped operation; nothing in the domain layer reads a global "current
/// user".
///
/// # Example
///
/// ```
/// use axum::http::{header, HeaderMap, HeaderValue};
/// use ranchbook_shared::auth::jwt::{create_token, Claims, TokenType};
/// use ranchbook_shared::auth::middleware::authenticate_bearer;
/// use uuid::Uuid;
///
/// let secret = "test-secret-key-at-least-32-bytes-long";
/// let claims = Claims::new(Uuid::new_v4(), "ana@example.com", None, TokenType::Access);
/// let token = create_token(&claims, secret).unwrap();
///
/// let mut headers = HeaderMap::new();
/// headers.insert(
///     header::AUTHORIZATION,
///     HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
/// );
///
/// let principal = authenticate_bearer(&headers, secret).unwrap();
/// assert_eq!(principal.email, "ana@example.com");
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, Claims, JwtError};

/// Authenticated caller of a scoped operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Farm selected at login or via switch-farm, if any
    pub farm_id: Option<Uuid>,

    /// Email carried in the token
    pub email: String,
}

impl Principal {
    pub fn new(user_id: Uuid, farm_id: Option<Uuid>, email: impl Into<String>) -> Self {
        Self {
            user_id,
            farm_id,
            email: email.into(),
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            farm_id: claims.farm_id,
            email: claims.email,
        }
    }
}

/// Error type for authentication
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Header present but not a bearer token
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),
}

/// Resolves the principal from request headers
///
/// # Errors
///
/// - `MissingCredentials` when no `Authorization` header is present
/// - `InvalidFormat` when the header is not `Bearer <token>`
/// - `InvalidToken` when the token is expired, forged or a refresh token
pub fn authenticate_bearer(headers: &HeaderMap, secret: &str) -> Result<Principal, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
        _ => AuthError::InvalidToken(format!("Invalid token: {}", e)),
    })?;

    Ok(Principal::from(claims))
}
