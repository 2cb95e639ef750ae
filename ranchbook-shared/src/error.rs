/// Domain error taxonomy
///
/// Every scoped operation in this crate returns `Result<T, ScopeError>`.
/// The variants are terminal: none of them is retried by the caller.
///
/// - `AccessDenied`: the principal is authenticated but not a member of the
///   farm the target resolves to (or the farm does not exist at all)
/// - `NotFound`: the entity id does not resolve to any row
/// - `Validation`: payload violates a domain rule, raised before any write
/// - `Conflict`: a uniqueness rule was violated (duplicate tag, duplicate member)

use crate::models::membership::FarmRole;

/// Result alias used across the domain layer
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Error type for farm-scoped operations
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// Principal cannot act on the target farm
    #[error("Access denied")]
    AccessDenied,

    /// Principal is a member but lacks the required role
    #[error("Insufficient role: requires {required:?}, has {actual:?}")]
    InsufficientRole { required: FarmRole, actual: FarmRole },

    /// Entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Payload violates a domain rule
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rendering an export failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ScopeError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("constraint");
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    return ScopeError::Conflict(format!("Duplicate value violates {}", constraint))
                }
                // foreign_key_violation, check_violation
                Some("23503") | Some("23514") => {
                    return ScopeError::Validation(format!("Value violates {}", constraint))
                }
                _ => {}
            }
        }
        ScopeError::Database(err)
    }
}

impl From<validator::ValidationErrors> for ScopeError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ScopeError::Validation(errors.to_string())
    }
}

impl ScopeError {
    /// Shorthand for a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        ScopeError::Validation(message.into())
    }
}
