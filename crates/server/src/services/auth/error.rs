//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication and user management.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable token was presented (missing, unknown, expired, revoked).
    #[error("authentication required")]
    Unauthenticated,

    /// The user or their organization has been deactivated.
    #[error("account is inactive")]
    AccountInactive,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The caller's role does not allow the operation.
    #[error("insufficient permissions")]
    Forbidden,

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] autohaul_core::EmailError),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[source] RepositoryError),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Forbidden => Self::Forbidden,
            other => Self::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_denial_is_forbidden() {
        assert!(matches!(
            AuthError::from(RepositoryError::Forbidden),
            AuthError::Forbidden
        ));
        assert!(matches!(
            AuthError::from(RepositoryError::NotFound),
            AuthError::Repository(RepositoryError::NotFound)
        ));
    }
}
