//! Security outcomes surfaced to HTTP clients

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use testshaper_protocol::ErrorResponse;
use thiserror::Error;

/// Errors returned by the guard, token issuer, rate limiter and handlers
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Account is locked. Try again later.")]
    AccountLocked { until: Option<DateTime<Utc>> },

    #[error("Invalid email or password")]
    AuthenticationFailed,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Too many requests")]
    TooManyRequests,

    /// A backing store or the policy could not be read; the request fails
    /// closed.
    #[error("Service temporarily unavailable")]
    Unavailable(String),

    #[error("Access denied")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::AccountLocked { .. } => StatusCode::LOCKED,
            AuthError::AuthenticationFailed | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<testshaper_core::Error> for AuthError {
    fn from(err: testshaper_core::Error) -> Self {
        match err {
            testshaper_core::Error::WeakPassword(msg) | testshaper_core::Error::InvalidKey(msg) => {
                AuthError::BadRequest(msg)
            }
            e if e.is_unavailable() => AuthError::Unavailable(e.to_string()),
            e => AuthError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AuthError::TooManyRequests => {
                return (status, "Too many requests").into_response();
            }
            AuthError::Unavailable(detail) | AuthError::Internal(detail) => {
                tracing::error!("{}: {}", self, detail);
            }
            _ => {}
        }
        (status, Json(ErrorResponse::new(status.as_u16(), self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testshaper_core::Error;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::AccountLocked { until: None }.status_code(),
            StatusCode::LOCKED
        );
        assert_eq!(AuthError::AuthenticationFailed.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AuthError::Unavailable("db".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_core_error_mapping() {
        let err: AuthError = Error::StorageUnavailable("down".into()).into();
        assert!(matches!(err, AuthError::Unavailable(_)));

        let err: AuthError = Error::WeakPassword("too short".into()).into();
        assert!(matches!(err, AuthError::BadRequest(ref m) if m == "too short"));

        let err: AuthError = Error::InvalidKey("key too long".into()).into();
        assert!(matches!(err, AuthError::BadRequest(_)));

        let err: AuthError = Error::Deserialization("bad".into()).into();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn test_unavailable_message_hides_detail() {
        let err = AuthError::Unavailable("rocksdb: IO error at /secret/path".into());
        assert_eq!(err.to_string(), "Service temporarily unavailable");
    }
}
