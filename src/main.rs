//! NFDas server binary
//!
//! ```bash
//! JWT_SECRET=change-me DATABASE_URL=sqlite://data/nfdas.db?mode=rwc ./nfdas
//! ```
//!
//! Settings come from `config.toml` (or `$NFDAS_CONFIG`) and the environment;
//! see [`nfdas::configs::AppConfig`].

use anyhow::{Context, Result};
use log::info;
use nfdas::auth_token::TokenIssuer;
use nfdas::configs::AppConfig;
use nfdas::pfx_key::load_legacy_provider;
use nfdas::storage::Storage;
use nfdas::webserver::{start_webserver, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!("=== NFDas ({}) ===", config.environment);

    load_legacy_provider();

    let storage = Arc::new(
        Storage::connect(&config.database, &config.uploads.directory)
            .await
            .context("Failed to initialize storage")?,
    );
    info!("✓ Database ready");
    info!("✓ Certificates stored under {}", config.uploads.directory.display());

    let tokens = Arc::new(TokenIssuer::new(
        config.auth.jwt_secret,
        config.auth.token_ttl_days,
    ));

    let state = AppState {
        storage: Arc::clone(&storage),
        tokens,
        max_upload_bytes: config.uploads.max_file_size,
    };

    let served = start_webserver(&config.server, state).await;

    storage.close().await;
    info!("Database pool closed");
    served
}
