//! HTTP-boundary error type
//!
//! Every handler returns `Result<_, ApiError>`. The variant decides the status
//! code; internal failures are logged with their full context and rendered as a
//! generic message.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::auth_token::TokenError;
use crate::certificate_validator::CertificateError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input, failed business rules (400)
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid or expired token, bad credentials (401)
    #[error("{0}")]
    Authentication(String),
    /// Authenticated but not allowed, e.g. an inactive account (403)
    #[error("{0}")]
    Forbidden(String),
    /// Absent or not owned by the caller (404)
    #[error("{0}")]
    NotFound(String),
    /// Duplicate email or duplicate tax id for the same owner (409)
    #[error("{0}")]
    Conflict(String),
    /// Anything unexpected (500)
    #[error("{public_message}")]
    Internal {
        public_message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Wrap an unexpected failure with the message shown to the client.
    pub fn internal(public_message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            public_message: public_message.into(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Authentication(err.to_string())
    }
}

/// Certificate problems are the client's to fix: wrong passphrase, broken
/// container or a certificate outside its validity window.
impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal("Internal server error", err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::Validation(format!("Invalid request body: {}", err.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::Validation(format!("Invalid id: {}", err.body_text()))
    }
}

/// Attach a client-facing message to an unexpected failure.
pub trait ResultExt<T> {
    fn or_internal(self, public_message: &str) -> Result<T, ApiError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_internal(self, public_message: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::internal(public_message, e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { public_message, source } = &self {
            log::error!("{}: {:#}", public_message, source);
        }
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal("boom", anyhow::anyhow!("detail")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = ApiError::internal("Failed to list companies", anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "Failed to list companies");
    }

    #[test]
    fn test_wrong_passphrase_is_client_error() {
        let err: ApiError = CertificateError::WrongPassphrase.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn test_or_internal() {
        let failed: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let err = failed.or_internal("Failed to save certificate").unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Failed to save certificate");
    }

    #[test]
    fn test_expired_token_message() {
        let err: ApiError = TokenError::Expired.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Token expired");
    }
}
