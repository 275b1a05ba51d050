use anyhow::{bail, Context, Result};
use log::warn;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEVELOPMENT_JWT_SECRET: &str = "nfdas-development-secret";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            uploads: UploadConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    /// Serve HTTPS when both paths are present.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            web_root: default_web_root(),
            tls: None,
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_web_root() -> PathBuf {
    PathBuf::from("public")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/nfdas.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: SecretString,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

fn default_jwt_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_token_ttl_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_uploads_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: default_uploads_dir(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads/certificates")
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load `config.toml` (or `$NFDAS_CONFIG`) when present, apply environment
    /// overrides and validate the result.
    pub fn load() -> Result<Self> {
        let path = env::var("NFDAS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override file values with environment variables.
    ///
    /// The lookup is injected so tests don't have to mutate the process
    /// environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("APP_ENV") {
            self.environment = value;
        }
        if let Some(value) = lookup("HOST") {
            self.server.host = value;
        }
        if let Some(value) = lookup("PORT") {
            self.server.port = value
                .parse()
                .context(format!("PORT is not a valid port number: {}", value))?;
        }
        if let Some(value) = lookup("WEB_ROOT") {
            self.server.web_root = PathBuf::from(value);
        }
        if let (Some(cert_path), Some(key_path)) = (lookup("TLS_CERT_PATH"), lookup("TLS_KEY_PATH"))
        {
            self.server.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert_path),
                key_path: PathBuf::from(key_path),
            });
        }
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = lookup("DB_MAX_CONNECTIONS") {
            self.database.max_connections = value
                .parse()
                .context("DB_MAX_CONNECTIONS must be a positive integer")?;
        }
        if let Some(value) = lookup("DB_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = value
                .parse()
                .context("DB_ACQUIRE_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Some(value) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = SecretString::from(value);
        }
        if let Some(value) = lookup("TOKEN_TTL_DAYS") {
            self.auth.token_ttl_days = value
                .parse()
                .context("TOKEN_TTL_DAYS must be an integer")?;
        }
        if let Some(value) = lookup("UPLOADS_DIR") {
            self.uploads.directory = PathBuf::from(value);
        }
        if let Some(value) = lookup("MAX_UPLOAD_BYTES") {
            self.uploads.max_file_size = value
                .parse()
                .context("MAX_UPLOAD_BYTES must be a positive integer")?;
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Reject unusable settings. Outside production an empty JWT secret is
    /// replaced by a fixed development secret.
    pub fn validate(&mut self) -> Result<()> {
        if self.auth.jwt_secret.expose_secret().is_empty() {
            if self.is_production() {
                bail!("JWT_SECRET must be set in production");
            }
            warn!("JWT_SECRET is not set, using the development secret");
            self.auth.jwt_secret = SecretString::from(DEVELOPMENT_JWT_SECRET.to_string());
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be at least 1");
        }
        if self.auth.token_ttl_days <= 0 {
            bail!("auth.token_ttl_days must be positive");
        }
        if self.uploads.max_file_size == 0 {
            bail!("uploads.max_file_size must be positive");
        }
        Ok(())
    }
}
