//! HTTP handlers, one module per resource
//!
//! Handlers validate input, call into storage and the certificate workflow,
//! and shape JSON responses. Every failure leaves as an [`ApiError`].

pub mod auth;
pub mod certificates;
pub mod companies;
pub mod service;

use chrono::{SecondsFormat, Utc};

use crate::error::ApiError;

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Map a unique-constraint violation to 409, anything else to 500.
pub(crate) fn conflict_or_internal(err: sqlx::Error, conflict: &str, context: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ApiError::Conflict(conflict.to_string())
        }
        _ => ApiError::internal(context, err),
    }
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
