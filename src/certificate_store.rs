//! Certificate ingestion and removal
//!
//! An upload moves through these stages:
//!
//! ```text
//! Received -> OwnershipVerified -> Parsed -> Validated -> Persisted
//!     \______________\_______________\_________\_________> Rejected
//! ```
//!
//! The received bytes live in a transient file owned by a [`TransientUpload`]
//! guard. Every way out of [`store_certificate`] other than a committed insert
//! drops the guard, which deletes the file. That includes the request future
//! being dropped when the client disconnects before persistence starts; the
//! final move and insert run on their own task and are not cut short.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::certificate_validator::{validate_certificate, CertificateSummary};
use crate::error::{ApiError, ResultExt};
use crate::models::{CertificateView, NewCertificate};
use crate::ownership::{ensure_owned, OwnedResource};
use crate::password::hash_secret;
use crate::pfx_key::load_pfx;
use crate::storage::Storage;

pub const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/x-pkcs12", "application/pkcs12"];
pub const ACCEPTED_EXTENSION: &str = "pfx";

/// Whether a multipart part may be a PKCS#12 container, judged by its declared
/// content type or its file name.
pub fn is_accepted_upload(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let type_ok = content_type
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            ACCEPTED_CONTENT_TYPES
                .iter()
                .any(|accepted| essence.eq_ignore_ascii_case(accepted))
        })
        .unwrap_or(false);
    let extension_ok = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(ACCEPTED_EXTENSION))
        .unwrap_or(false);
    type_ok || extension_ok
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Received,
    OwnershipVerified,
    Parsed,
    Validated,
    Persisted,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Received => "received",
            UploadStage::OwnershipVerified => "ownership-verified",
            UploadStage::Parsed => "parsed",
            UploadStage::Validated => "validated",
            UploadStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// A file on disk that is removed on drop unless committed.
#[derive(Debug)]
pub struct TransientUpload {
    path: PathBuf,
    armed: bool,
}

impl TransientUpload {
    /// Create an empty `<uuid>.pfx` in `dir` and hand back the open file for
    /// writing.
    pub async fn create(dir: &Path) -> Result<(Self, tokio::fs::File)> {
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), ACCEPTED_EXTENSION));
        let file = tokio::fs::File::create(&path)
            .await
            .context(format!("Failed to create transient file {}", path.display()))?;
        Ok((Self { path, armed: true }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the file into `dir`, keeping its generated name. Still removed on
    /// drop until [`commit`](Self::commit) is called.
    pub async fn promote(&mut self, dir: &Path) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .context("Transient file has no name")?;
        let destination = dir.join(file_name);
        tokio::fs::rename(&self.path, &destination)
            .await
            .context(format!(
                "Failed to move {} to {}",
                self.path.display(),
                destination.display()
            ))?;
        self.path = destination;
        Ok(())
    }

    /// Keep the file and return where it lives.
    pub fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

// Blocking unlink on purpose: Drop cannot await, and this has to run when the
// request future is cancelled too.
impl Drop for TransientUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed transient upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove transient upload {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

pub struct CertificateUpload {
    pub company_id: i64,
    pub user_id: i64,
    pub passphrase: SecretString,
    pub transient: TransientUpload,
}

/// Run a received upload through ownership, parsing, validation and
/// persistence.
pub async fn store_certificate(
    storage: &Arc<Storage>,
    upload: CertificateUpload,
) -> Result<CertificateView, ApiError> {
    store_certificate_at(storage, upload, Utc::now()).await
}

pub(crate) async fn store_certificate_at(
    storage: &Arc<Storage>,
    upload: CertificateUpload,
    now: DateTime<Utc>,
) -> Result<CertificateView, ApiError> {
    let CertificateUpload {
        company_id,
        user_id,
        passphrase,
        transient,
    } = upload;

    ensure_owned(storage, OwnedResource::Company(company_id), user_id)
        .await
        .map_err(|e| rejected(UploadStage::Received, e))?;

    let der = tokio::fs::read(transient.path())
        .await
        .or_internal("Failed to read uploaded certificate")?;

    let (summary, passphrase_hash) =
        tokio::task::spawn_blocking(move || vet_container(&der, &passphrase, now))
            .await
            .or_internal("Failed to process certificate")??;

    spawn_persist(
        Arc::clone(storage),
        company_id,
        transient,
        summary,
        passphrase_hash,
    )
    .await
    .or_internal("Failed to save certificate")?
}

/// Move the file into place and insert its row on a task of its own. Once
/// started it runs to completion even if the request is dropped, so a
/// committed row never loses its file to the cleanup guard.
fn spawn_persist(
    storage: Arc<Storage>,
    company_id: i64,
    transient: TransientUpload,
    summary: CertificateSummary,
    passphrase_hash: String,
) -> JoinHandle<Result<CertificateView, ApiError>> {
    tokio::spawn(async move {
        persist(&storage, company_id, transient, &summary, &passphrase_hash).await
    })
}

async fn persist(
    storage: &Storage,
    company_id: i64,
    mut transient: TransientUpload,
    summary: &CertificateSummary,
    passphrase_hash: &str,
) -> Result<CertificateView, ApiError> {
    transient
        .promote(storage.uploads_dir())
        .await
        .or_internal("Failed to save certificate")?;
    let file_path = transient.path().to_string_lossy().into_owned();

    let certificate = storage
        .insert_certificate(&NewCertificate {
            company_id,
            file_path: &file_path,
            password_hash: passphrase_hash,
            issuer: &summary.issuer,
            valid_from: summary.valid_from,
            valid_until: summary.valid_until,
        })
        .await
        .or_internal("Failed to save certificate")?;

    let stored = transient.commit();
    info!(
        "Certificate {} {} for company {} ({})",
        certificate.id,
        UploadStage::Persisted,
        company_id,
        stored.display()
    );
    Ok(certificate)
}

/// Parse, validate and hash on the blocking pool.
fn vet_container(
    der: &[u8],
    passphrase: &SecretString,
    now: DateTime<Utc>,
) -> Result<(CertificateSummary, String), ApiError> {
    let contents = load_pfx(der, passphrase.expose_secret())
        .map_err(|e| rejected(UploadStage::OwnershipVerified, e.into()))?;
    debug!(
        "Container {}: leaf plus {} chain certificate(s)",
        UploadStage::Parsed,
        contents.chain_len
    );

    let summary = validate_certificate(&contents.certificate, now)
        .map_err(|e| rejected(UploadStage::Parsed, e.into()))?;
    debug!("Certificate from {} {}", summary.issuer, UploadStage::Validated);

    let passphrase_hash =
        hash_secret(passphrase.expose_secret()).or_internal("Failed to process certificate")?;
    Ok((summary, passphrase_hash))
}

fn rejected(after: UploadStage, err: ApiError) -> ApiError {
    info!("Certificate upload rejected after stage {}: {}", after, err);
    err
}

/// Remove a certificate the caller owns: file first, then the row.
pub async fn delete_certificate(
    storage: &Storage,
    certificate_id: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    ensure_owned(storage, OwnedResource::Certificate(certificate_id), user_id).await?;

    let record = storage
        .find_certificate(certificate_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Certificate not found"))?;

    remove_backing_file(Path::new(&record.file_path))
        .await
        .or_internal("Failed to delete certificate")?;
    storage.delete_certificate(certificate_id).await?;

    info!("Certificate {} deleted", certificate_id);
    Ok(())
}

/// Delete a stored certificate file; an already-missing file is fine.
pub async fn remove_backing_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Certificate file {} was already missing", path.display());
            Ok(())
        }
        Err(e) => Err(e).context(format!("Failed to remove {}", path.display())),
    }
}
