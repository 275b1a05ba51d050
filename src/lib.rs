//! NFDas - company and digital certificate custody backend
//!
//! A multi-tenant REST service: users register and log in with bearer tokens,
//! register companies by CNPJ, and upload the company's PKCS#12 (`.pfx`)
//! certificate. Uploaded containers are opened with the supplied passphrase,
//! their leaf certificate is checked against its validity window and only then
//! is the file kept and recorded.
//!
//! # Request flow
//!
//! ```text
//! axum router ──► session::AuthUser (bearer token)
//!      │
//!      ├─► handlers::auth          users, login, tokens
//!      ├─► handlers::companies     ownership::ensure_owned ─► storage
//!      └─► handlers::certificates  certificate_store
//!                                    ├─ pfx_key::load_pfx
//!                                    ├─ certificate_validator
//!                                    └─ storage + uploads directory
//! ```
//!
//! # Module Overview
//!
//! - [`configs`]: TOML file plus environment overrides
//! - [`storage`]: SQLite pool, schema and queries
//! - [`pfx_key`]: PKCS#12 decoding
//! - [`certificate_validator`]: issuer and validity rules
//! - [`certificate_store`]: the upload and delete workflows
//! - [`ownership`]: tenant isolation, reported as not-found
//! - [`auth_token`]: HS256 bearer tokens
//! - [`webserver`]: routes, TLS and graceful shutdown
//!
//! # Security Considerations
//!
//! - Account passwords and certificate passphrases are stored as Argon2id
//!   hashes only.
//! - A resource owned by another tenant is indistinguishable from a missing
//!   one.
//! - A rejected or abandoned upload never leaves its transient file behind.

pub mod auth_token;
pub mod certificate_store;
pub mod certificate_validator;
pub mod configs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod ownership;
pub mod password;
pub mod pfx_key;
pub mod session;
pub mod storage;
pub mod validators;
pub mod webserver;

#[cfg(test)]
mod test_fixtures;
