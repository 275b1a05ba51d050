//! Tenant isolation
//!
//! Every company and certificate operation passes through [`ensure_owned`]
//! before touching data. A resource that exists but belongs to someone else is
//! reported exactly like one that does not exist.

use crate::error::ApiError;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnedResource {
    Company(i64),
    Certificate(i64),
}

impl OwnedResource {
    fn not_found(&self) -> ApiError {
        match self {
            OwnedResource::Company(_) => ApiError::not_found("Company not found"),
            OwnedResource::Certificate(_) => ApiError::not_found("Certificate not found"),
        }
    }
}

/// `Ok(())` only when `resource` exists and belongs to `user_id`.
pub async fn ensure_owned(
    storage: &Storage,
    resource: OwnedResource,
    user_id: i64,
) -> Result<(), ApiError> {
    let query = match resource {
        OwnedResource::Company(_) => "SELECT COUNT(*) FROM companies WHERE id = ? AND user_id = ?",
        OwnedResource::Certificate(_) => {
            "SELECT COUNT(*) FROM certificates c \
             JOIN companies co ON co.id = c.company_id \
             WHERE c.id = ? AND co.user_id = ?"
        }
    };
    let id = match resource {
        OwnedResource::Company(id) | OwnedResource::Certificate(id) => id,
    };

    let count: i64 = sqlx::query_scalar(query)
        .bind(id)
        .bind(user_id)
        .fetch_one(storage.pool())
        .await?;

    if count > 0 {
        Ok(())
    } else {
        Err(resource.not_found())
    }
}
