use std::path::Path as FsPath;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{conflict_or_internal, required};
use crate::certificate_store::remove_backing_file;
use crate::error::{ApiError, ResultExt};
use crate::ownership::{ensure_owned, OwnedResource};
use crate::session::AuthUser;
use crate::validators::{normalize_cnpj, validate_cnpj};
use crate::webserver::AppState;

const DUPLICATE_COMPANY: &str = "This company is already registered";

#[derive(Debug, Deserialize)]
pub struct CompanyRequest {
    pub name: Option<String>,
    pub cnpj: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: Option<String>,
}

pub async fn list(auth: AuthUser, State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let companies = state
        .storage
        .list_companies(auth.user_id)
        .await
        .or_internal("Failed to list companies")?;

    Ok(Json(json!({
        "status": "success",
        "total": companies.len(),
        "companies": companies,
    })))
}

pub async fn show(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(company_id) = id?;
    let company = state
        .storage
        .find_company(company_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(Json(json!({ "status": "success", "company": company })))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<CompanyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = body?;
    let (Some(name), Some(cnpj)) = (required(body.name), required(body.cnpj)) else {
        return Err(ApiError::validation("Name and CNPJ are required"));
    };
    if !validate_cnpj(&cnpj) {
        return Err(ApiError::validation("Invalid CNPJ"));
    }
    let cnpj = normalize_cnpj(&cnpj);

    if state.storage.company_cnpj_taken(auth.user_id, &cnpj).await? {
        return Err(ApiError::Conflict(DUPLICATE_COMPANY.to_string()));
    }
    let company = state
        .storage
        .insert_company(auth.user_id, &name, &cnpj)
        .await
        .map_err(|e| conflict_or_internal(e, DUPLICATE_COMPANY, "Failed to create company"))?;

    info!("Company {} created for user {}", company.id, auth.user_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Company created successfully",
            "company": company,
        })),
    ))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(company_id) = id?;
    ensure_owned(&state.storage, OwnedResource::Company(company_id), auth.user_id).await?;

    let Json(body) = body?;
    let name = required(body.name).ok_or_else(|| ApiError::validation("Name is required"))?;

    state
        .storage
        .rename_company(company_id, &name)
        .await
        .or_internal("Failed to update company")?;

    Ok(Json(json!({
        "status": "success",
        "message": "Company updated successfully",
    })))
}

/// Removes the company's certificate files, then the company row. Certificate
/// rows follow through the foreign key cascade.
pub async fn remove(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(company_id) = id?;
    ensure_owned(&state.storage, OwnedResource::Company(company_id), auth.user_id).await?;

    for file_path in state.storage.certificate_paths(company_id).await? {
        remove_backing_file(FsPath::new(&file_path))
            .await
            .or_internal("Failed to delete company")?;
    }
    state
        .storage
        .delete_company(company_id)
        .await
        .or_internal("Failed to delete company")?;

    info!("Company {} deleted by user {}", company_id, auth.user_id);
    Ok(Json(json!({
        "status": "success",
        "message": "Company deleted successfully",
    })))
}
