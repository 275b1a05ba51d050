//! Certificate business rules
//!
//! Turns a parsed leaf certificate into the normalized summary stored next to
//! each uploaded container: issuer common name, validity bounds and whether
//! the certificate is usable right now.

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::x509::X509Ref;
use thiserror::Error;

/// Issuer label used when the issuer name has no commonName attribute
pub const DEFAULT_ISSUER: &str = "Certificate Authority";

/// Calendar format used in user-facing validity messages (dd/mm/yyyy)
pub const DATE_FORMAT: &str = "%d/%m/%Y";

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Invalid certificate file: {0}")]
    Parse(String),
    #[error("Incorrect certificate passphrase")]
    WrongPassphrase,
    #[error("Certificate not found in file")]
    MissingCertificate,
    #[error("Private key not found in file")]
    MissingPrivateKey,
    #[error(
        "Certificate expired or not yet valid. Valid from {} to {}",
        .valid_from.format(DATE_FORMAT),
        .valid_until.format(DATE_FORMAT)
    )]
    OutsideValidity {
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    },
}

/// Normalized view of a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub currently_valid: bool,
}

impl CertificateSummary {
    /// Summarize `certificate` as seen at instant `now`.
    pub fn inspect(certificate: &X509Ref, now: DateTime<Utc>) -> Result<Self, CertificateError> {
        let valid_from = asn1_to_utc(certificate.not_before())?;
        let valid_until = asn1_to_utc(certificate.not_after())?;

        Ok(Self {
            issuer: issuer_common_name(certificate),
            valid_from,
            valid_until,
            currently_valid: valid_from <= now && now <= valid_until,
        })
    }

    /// The rejection to surface when the certificate is not currently valid.
    pub fn ensure_current(&self) -> Result<(), CertificateError> {
        if self.currently_valid {
            Ok(())
        } else {
            Err(CertificateError::OutsideValidity {
                valid_from: self.valid_from,
                valid_until: self.valid_until,
            })
        }
    }
}

/// Inspect and apply the temporal rule in one step.
pub fn validate_certificate(
    certificate: &X509Ref,
    now: DateTime<Utc>,
) -> Result<CertificateSummary, CertificateError> {
    let summary = CertificateSummary::inspect(certificate, now)?;
    summary.ensure_current()?;
    Ok(summary)
}

/// Last commonName in the issuer name, or [`DEFAULT_ISSUER`].
fn issuer_common_name(certificate: &X509Ref) -> String {
    certificate
        .issuer_name()
        .entries_by_nid(Nid::COMMONNAME)
        .filter_map(|entry| {
            std::str::from_utf8(entry.data().as_slice())
                .ok()
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .last()
        .unwrap_or_else(|| DEFAULT_ISSUER.to_string())
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CertificateError> {
    let unreadable = || CertificateError::Parse("unreadable certificate validity".to_string());

    let epoch = Asn1Time::from_unix(0).map_err(|_| unreadable())?;
    let diff = epoch.diff(time).map_err(|_| unreadable())?;
    let seconds = i64::from(diff.days) * SECONDS_PER_DAY + i64::from(diff.secs);

    DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(unreadable)
}
