//! Row types and their client-facing views

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

/// What clients see of a user; never the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub status: String,
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            status: user.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Company {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub cnpj: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CertificateRecord {
    pub id: i64,
    pub company_id: i64,
    pub file_path: String,
    pub password_hash: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Certificate metadata as returned to clients. The stored path and
/// passphrase hash stay server-side.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CertificateView {
    pub id: i64,
    pub company_id: i64,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewCertificate<'a> {
    pub company_id: i64,
    pub file_path: &'a str,
    pub password_hash: &'a str,
    pub issuer: &'a str,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}
