use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{conflict_or_internal, required};
use crate::error::{ApiError, ResultExt};
use crate::models::UserView;
use crate::password::{hash_secret_blocking, verify_secret_blocking};
use crate::session::AuthUser;
use crate::validators::{validate_email, validate_password};
use crate::webserver::AppState;

const BAD_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Passwords are taken verbatim; only emptiness counts as missing.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let (Some(email), Some(password), Some(name)) = (
        required(body.email),
        present(body.password),
        required(body.name),
    ) else {
        return Err(ApiError::validation("Email, password and name are required"));
    };

    if !validate_email(&email) {
        return Err(ApiError::validation("Invalid email"));
    }
    if !validate_password(&password) {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    if state.storage.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_secret_blocking(password)
        .await
        .or_internal("Failed to register user")?;
    let user = state
        .storage
        .insert_user(&email, &password_hash, &name)
        .await
        .map_err(|e| conflict_or_internal(e, "Email already registered", "Failed to register user"))?;

    let token = state
        .tokens
        .issue(user.id, &user.email)
        .or_internal("Failed to register user")?;

    info!("User {} registered", user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "User registered successfully",
            "user": UserView::from(&user),
            "token": token,
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let (Some(email), Some(password)) = (required(body.email), present(body.password)) else {
        return Err(ApiError::validation("Email and password are required"));
    };

    let user = state
        .storage
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::Authentication(BAD_CREDENTIALS.to_string()))?;

    let matches = verify_secret_blocking(password, user.password_hash.clone())
        .await
        .or_internal("Failed to log in")?;
    if !matches {
        return Err(ApiError::Authentication(BAD_CREDENTIALS.to_string()));
    }

    if !user.is_active() {
        return Err(ApiError::Forbidden("User inactive".to_string()));
    }

    let token = state
        .tokens
        .issue(user.id, &user.email)
        .or_internal("Failed to log in")?;

    Ok(Json(json!({
        "status": "success",
        "message": "Login successful",
        "user": UserView::from(&user),
        "token": token,
    })))
}

pub async fn me(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let user = state
        .storage
        .find_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(json!({
        "status": "success",
        "user": UserView::from(&user),
    })))
}
