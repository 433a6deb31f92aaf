//! Auth Error Types
//!
//! Every public operation of the engine returns one of these kinds. Storage
//! and transport faults collapse into [`AuthError::ServiceUnavailable`], the
//! only retryable kind; all authentication kinds are terminal.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

use crate::domain::value_object::auth_policy::PolicyViolation;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown or inactive OAuth client
    #[error("Client not found")]
    ClientNotFound,

    /// Unknown user or wrong password (deliberately indistinguishable)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Too many failed attempts
    #[error("Account is temporarily locked")]
    AccountLocked { retry_after: Duration },

    #[error("Email address has not been verified")]
    EmailNotVerified,

    /// Client policy mandates MFA but the account has not enrolled it
    #[error("Two-factor authentication is required for this client")]
    TwoFactorRequired,

    /// Bad, expired or already used challenge token, or wrong code
    #[error("Invalid or expired two-factor challenge")]
    InvalidChallenge,

    /// Bad, expired or reused refresh token, or unparseable access token
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password does not satisfy the client policy: {0}")]
    PolicyViolation(#[from] PolicyViolation),

    #[error("Email address is already registered")]
    EmailAlreadyRegistered,

    /// Request is well-formed JSON but carries unusable values
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authenticated, but not allowed to perform the operation
    #[error("Insufficient permissions")]
    Forbidden,

    /// Backing store unreachable, failing or timed out (detail is log-only)
    #[error("Service temporarily unavailable")]
    ServiceUnavailable(String),

    /// Programming or configuration fault (detail is log-only)
    #[error("Internal error")]
    Internal(String),
}

impl AuthError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::ClientNotFound => ErrorKind::NotFound,
            AuthError::InvalidCredentials
            | AuthError::InvalidChallenge
            | AuthError::InvalidToken => ErrorKind::Unauthorized,
            AuthError::AccountLocked { .. } => ErrorKind::Locked,
            AuthError::EmailNotVerified | AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::TwoFactorRequired => ErrorKind::PreconditionRequired,
            AuthError::PolicyViolation(_) | AuthError::InvalidInput(_) => ErrorKind::BadRequest,
            AuthError::EmailAlreadyRegistered => ErrorKind::Conflict,
            AuthError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Only storage/transport faults may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }

    /// Whole seconds until a locked account may try again (at least 1)
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AuthError::AccountLocked { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        let mut err = AppError::new(self.kind(), self.to_string());

        if let Some(secs) = self.retry_after_secs() {
            err = err.with_retry_after(secs);
        }

        match self {
            AuthError::PolicyViolation(_) => {
                err.with_action("Choose a password that satisfies the client's password policy")
            }
            AuthError::TwoFactorRequired => {
                err.with_action("Enrol an authenticator app before signing in to this client")
            }
            AuthError::EmailNotVerified => err.with_action("Verify your email address first"),
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::ServiceUnavailable(detail) => {
                tracing::error!(detail = %detail, "Auth store unavailable");
            }
            AuthError::Internal(detail) => {
                tracing::error!(detail = %detail, "Auth internal error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::AccountLocked { .. } => {
                tracing::warn!("Login attempt on locked account");
            }
            AuthError::InvalidToken => {
                tracing::warn!("Invalid token presented");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::ServiceUnavailable(format!("database: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_service_unavailable_is_retryable() {
        assert!(AuthError::ServiceUnavailable("timeout".into()).is_retryable());
        assert!(!AuthError::InvalidToken.is_retryable());
        assert!(!AuthError::Internal("bug".into()).is_retryable());
        assert!(
            !AuthError::AccountLocked {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::TwoFactorRequired.status_code(),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            AuthError::AccountLocked {
                retry_after: Duration::from_secs(1)
            }
            .status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(
            AuthError::ServiceUnavailable("db".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let err = AuthError::AccountLocked {
            retry_after: Duration::from_millis(1500),
        };
        assert_eq!(err.retry_after_secs(), Some(2));
        assert_eq!(err.to_app_error().retry_after_secs(), Some(2));

        let err = AuthError::AccountLocked {
            retry_after: Duration::ZERO,
        };
        assert_eq!(err.retry_after_secs(), Some(1));
    }

    #[test]
    fn test_fault_details_are_not_rendered() {
        let err = AuthError::ServiceUnavailable("connection refused to 10.0.0.5".into());
        assert!(!err.to_app_error().message().contains("10.0.0.5"));

        let err = AuthError::Internal("bad secret length".into());
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_sqlx_errors_become_service_unavailable() {
        let err: AuthError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
    }
}
