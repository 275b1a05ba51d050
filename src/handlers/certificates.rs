use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::rejection::PathRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::certificate_store::{
    delete_certificate, is_accepted_upload, store_certificate, CertificateUpload, TransientUpload,
};
use crate::error::{ApiError, ResultExt};
use crate::ownership::{ensure_owned, OwnedResource};
use crate::session::AuthUser;
use crate::webserver::AppState;

const FILE_FIELD: &str = "certificate";
const PASSPHRASE_FIELDS: [&str; 2] = ["password", "passphrase"];

pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(company_id) = id?;
    ensure_owned(&state.storage, OwnedResource::Company(company_id), auth.user_id).await?;

    let certificates = state
        .storage
        .list_certificates(company_id)
        .await
        .or_internal("Failed to list certificates")?;

    Ok(Json(json!({
        "status": "success",
        "total": certificates.len(),
        "certificates": certificates,
    })))
}

pub async fn upload(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Path(company_id) = id?;
    let mut multipart =
        multipart.map_err(|e| ApiError::validation(format!("Invalid upload: {}", e.body_text())))?;

    let mut transient: Option<TransientUpload> = None;
    let mut passphrase: Option<SecretString> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD {
            if !is_accepted_upload(field.content_type(), field.file_name()) {
                return Err(ApiError::validation("Only .pfx files are allowed"));
            }
            transient = Some(receive_file(&state, &mut field).await?);
        } else if PASSPHRASE_FIELDS.contains(&name.as_str()) {
            let text = field.text().await.map_err(malformed)?;
            passphrase = Some(SecretString::from(text));
        }
    }

    let transient =
        transient.ok_or_else(|| ApiError::validation("Certificate file is required"))?;
    let passphrase =
        passphrase.ok_or_else(|| ApiError::validation("Certificate passphrase is required"))?;

    let certificate = store_certificate(
        &state.storage,
        CertificateUpload {
            company_id,
            user_id: auth.user_id,
            passphrase,
            transient,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Certificate uploaded successfully",
            "certificate": {
                "id": certificate.id,
                "company_id": certificate.company_id,
                "issuer": certificate.issuer,
                "valid_from": certificate.valid_from,
                "valid_until": certificate.valid_until,
                "status": certificate.status,
            },
        })),
    ))
}

/// Stream a file part into a transient file, enforcing the size limit.
async fn receive_file(state: &AppState, field: &mut Field<'_>) -> Result<TransientUpload, ApiError> {
    let (transient, mut file) = TransientUpload::create(&state.storage.transient_dir())
        .await
        .or_internal("Failed to receive certificate")?;

    let mut received = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        received += chunk.len();
        if received > state.max_upload_bytes {
            return Err(ApiError::validation(format!(
                "Certificate file exceeds the {} byte limit",
                state.max_upload_bytes
            )));
        }
        file.write_all(&chunk)
            .await
            .or_internal("Failed to receive certificate")?;
    }
    file.flush().await.or_internal("Failed to receive certificate")?;
    Ok(transient)
}

fn malformed(err: MultipartError) -> ApiError {
    ApiError::validation(format!("Invalid upload: {}", err.body_text()))
}

pub async fn remove(
    auth: AuthUser,
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(certificate_id) = id?;
    delete_certificate(&state.storage, certificate_id, auth.user_id).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Certificate deleted successfully",
    })))
}
