//! Relational storage and upload directories
//!
//! `Storage` owns the bounded connection pool and the certificate upload
//! directories. One instance is created at startup, shared with every request
//! through the router state and closed on shutdown.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::configs::DatabaseConfig;
use crate::models::{
    CertificateRecord, CertificateView, Company, NewCertificate, UserRecord, STATUS_ACTIVE,
};

const TRANSIENT_SUBDIR: &str = "tmp";

const SCHEMA: [&str; 4] = [
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        cnpj TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        UNIQUE (user_id, cnpj)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS certificates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
        file_path TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        issuer TEXT NOT NULL,
        valid_from TEXT NOT NULL,
        valid_until TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_certificates_company ON certificates (company_id)",
];

pub struct Storage {
    pool: SqlitePool,
    uploads_dir: PathBuf,
}

impl Storage {
    /// Open the pool, create the schema and the upload directories.
    pub async fn connect(database: &DatabaseConfig, uploads_dir: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&database.url)
            .context(format!("Invalid database URL: {}", database.url))?
            .create_if_missing(true)
            .foreign_keys(true);

        let db_file = options.get_filename();
        if let Some(parent) = db_file.parent() {
            if !parent.as_os_str().is_empty() && !db_file.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context(format!(
                    "Failed to create database directory {}",
                    parent.display()
                ))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(database.max_connections)
            .acquire_timeout(Duration::from_secs(database.acquire_timeout_secs))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let storage = Storage {
            pool,
            uploads_dir: uploads_dir.to_path_buf(),
        };
        storage.init_schema().await?;
        storage.init_directories()?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize database schema")?;
        }
        Ok(())
    }

    fn init_directories(&self) -> Result<()> {
        for dir in [self.uploads_dir.clone(), self.transient_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)
                    .context(format!("Failed to create directory {}", dir.display()))?;
                info!("Created upload directory {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Permanent home of accepted certificate files
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Scratch area for uploads still being checked
    pub fn transient_dir(&self) -> PathBuf {
        self.uploads_dir.join(TRANSIENT_SUBDIR)
    }

    pub async fn ping(&self) -> Result<i64> {
        let value: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(value)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---------------------------------------------------------------- users

    pub async fn find_user_by_email(&self, email: &str) -> sqlx::Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_user(&self, user_id: i64) -> sqlx::Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
    ) -> sqlx::Result<UserRecord> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO users (email, password_hash, name, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(STATUS_ACTIVE)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(UserRecord {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            name: name.to_string(),
            status: STATUS_ACTIVE.to_string(),
            created_at,
        })
    }

    pub async fn set_user_status(&self, user_id: i64, status: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET status = ? WHERE id = ?")
            .bind(status)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------ companies

    pub async fn list_companies(&self, user_id: i64) -> sqlx::Result<Vec<Company>> {
        sqlx::query_as::<_, Company>(
            "SELECT id, user_id, name, cnpj, status, created_at FROM companies \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Company `company_id` if it belongs to `user_id`
    pub async fn find_company(&self, company_id: i64, user_id: i64) -> sqlx::Result<Option<Company>> {
        sqlx::query_as::<_, Company>(
            "SELECT id, user_id, name, cnpj, status, created_at FROM companies \
             WHERE id = ? AND user_id = ?",
        )
        .bind(company_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn company_cnpj_taken(&self, user_id: i64, cnpj: &str) -> sqlx::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM companies WHERE user_id = ? AND cnpj = ?",
        )
        .bind(user_id)
        .bind(cnpj)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn insert_company(&self, user_id: i64, name: &str, cnpj: &str) -> sqlx::Result<Company> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO companies (user_id, name, cnpj, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(cnpj)
        .bind(STATUS_ACTIVE)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Company {
            id,
            user_id,
            name: name.to_string(),
            cnpj: cnpj.to_string(),
            status: STATUS_ACTIVE.to_string(),
            created_at,
        })
    }

    pub async fn rename_company(&self, company_id: i64, name: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE companies SET name = ? WHERE id = ?")
            .bind(name)
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Certificate rows go with the company (ON DELETE CASCADE).
    pub async fn delete_company(&self, company_id: i64) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(company_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --------------------------------------------------------- certificates

    pub async fn list_certificates(&self, company_id: i64) -> sqlx::Result<Vec<CertificateView>> {
        sqlx::query_as::<_, CertificateView>(
            "SELECT id, company_id, issuer, valid_from, valid_until, status, created_at \
             FROM certificates WHERE company_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn certificate_paths(&self, company_id: i64) -> sqlx::Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT file_path FROM certificates WHERE company_id = ?")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_certificate(&self, certificate_id: i64) -> sqlx::Result<Option<CertificateRecord>> {
        sqlx::query_as::<_, CertificateRecord>("SELECT * FROM certificates WHERE id = ?")
            .bind(certificate_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn insert_certificate(&self, new: &NewCertificate<'_>) -> sqlx::Result<CertificateView> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO certificates \
             (company_id, file_path, password_hash, issuer, valid_from, valid_until, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.company_id)
        .bind(new.file_path)
        .bind(new.password_hash)
        .bind(new.issuer)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(STATUS_ACTIVE)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(CertificateView {
            id,
            company_id: new.company_id,
            issuer: new.issuer.to_string(),
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            status: STATUS_ACTIVE.to_string(),
            created_at,
        })
    }

    pub async fn delete_certificate(&self, certificate_id: i64) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM certificates WHERE id = ?")
            .bind(certificate_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Fresh file-backed database and upload root inside a temp directory.
    pub(crate) async fn temp_storage() -> (TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let database = DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
            ..DatabaseConfig::default()
        };
        let storage = Storage::connect(&database, &dir.path().join("uploads"))
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_connect_creates_directories_and_schema() {
        let (_dir, storage) = temp_storage().await;
        assert!(storage.uploads_dir().is_dir());
        assert!(storage.transient_dir().is_dir());
        assert_eq!(storage.ping().await.unwrap(), 1);
        // schema creation is idempotent
        storage.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_company_tax_id_unique_per_owner_only() {
        let (_dir, storage) = temp_storage().await;
        let alice = storage.insert_user("alice@x.com", "h", "Alice").await.unwrap();
        let bob = storage.insert_user("bob@x.com", "h", "Bob").await.unwrap();

        storage.insert_company(alice.id, "A", "11444777000161").await.unwrap();
        assert!(storage.company_cnpj_taken(alice.id, "11444777000161").await.unwrap());
        assert!(!storage.company_cnpj_taken(bob.id, "11444777000161").await.unwrap());

        storage.insert_company(bob.id, "B", "11444777000161").await.unwrap();
        let duplicate = storage.insert_company(alice.id, "A2", "11444777000161").await;
        match duplicate {
            Err(sqlx::Error::Database(db_err)) => assert!(db_err.is_unique_violation()),
            other => panic!("expected unique violation, got {:?}", other.map(|c| c.id)),
        }
    }

    #[tokio::test]
    async fn test_find_company_is_owner_scoped() {
        let (_dir, storage) = temp_storage().await;
        let alice = storage.insert_user("alice@x.com", "h", "Alice").await.unwrap();
        let bob = storage.insert_user("bob@x.com", "h", "Bob").await.unwrap();
        let company = storage.insert_company(alice.id, "A", "11444777000161").await.unwrap();

        assert!(storage.find_company(company.id, alice.id).await.unwrap().is_some());
        assert!(storage.find_company(company.id, bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deleting_company_cascades_certificates() {
        let (_dir, storage) = temp_storage().await;
        let user = storage.insert_user("alice@x.com", "h", "Alice").await.unwrap();
        let company = storage.insert_company(user.id, "A", "11444777000161").await.unwrap();
        let now = Utc::now();
        let cert = storage
            .insert_certificate(&NewCertificate {
                company_id: company.id,
                file_path: "uploads/x.pfx",
                password_hash: "h",
                issuer: "AC",
                valid_from: now,
                valid_until: now,
            })
            .await
            .unwrap();

        storage.delete_company(company.id).await.unwrap();
        assert!(storage.find_certificate(cert.id).await.unwrap().is_none());
    }
}
