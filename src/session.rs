//! Authenticated caller extraction

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth_token::{bearer_token, TokenError};
use crate::error::ApiError;
use crate::webserver::AppState;

/// Identity carried by a verified bearer token. Taking this as a handler
/// argument makes the route require authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str())
            .transpose()
            .map_err(|_| TokenError::Invalid)?;

        let token = bearer_token(header)?;
        let claims = state.tokens.verify(token)?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
        })
    }
}
