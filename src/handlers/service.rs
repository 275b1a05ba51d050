use axum::extract::State;
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use super::timestamp;
use crate::error::{ApiError, ResultExt};
use crate::webserver::AppState;

const APP_HOST_PREFIX: &str = "app.";

/// Service banner. Requests addressed to the `app.` host get the client
/// application flavour.
pub async fn root(headers: HeaderMap) -> Json<Value> {
    let is_app = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| host.starts_with(APP_HOST_PREFIX))
        .unwrap_or(false);

    let (message, kind, endpoints) = if is_app {
        (
            "Welcome to the NFDas app",
            "app",
            json!({
                "auth": "/api/auth",
                "companies": "/api/companies",
                "certificates": "/api/certificates",
            }),
        )
    } else {
        (
            "Welcome to NFDas",
            "landing",
            json!({
                "health": "/health",
                "auth": "/api/auth",
                "companies": "/api/companies",
                "certificates": "/api/certificates",
                "dbTest": "/api/db-test",
            }),
        )
    };

    Json(json!({
        "status": "OK",
        "message": message,
        "version": env!("CARGO_PKG_VERSION"),
        "type": kind,
        "endpoints": endpoints,
        "timestamp": timestamp(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "NFDas server is running",
        "timestamp": timestamp(),
    }))
}

pub async fn db_test(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let result = state
        .storage
        .ping()
        .await
        .or_internal("Database connection failed")?;

    Ok(Json(json!({
        "status": "OK",
        "message": "Database connection successful",
        "result": [{ "test": result }],
    })))
}
