use crate::auth_token::TokenIssuer;
use crate::configs::ServerConfig;
use crate::handlers::{auth, certificates, companies, service};
use crate::storage::Storage;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::fs::ServeDir;

/// Room for multipart boundaries and the passphrase field on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Shared handles injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub tokens: Arc<TokenIssuer>,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState, web_root: &Path) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(service::root))
        .route("/health", get(service::health))
        .route("/api/db-test", get(service::db_test))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/companies",
            get(companies::list).post(companies::create),
        )
        .route(
            "/api/companies/:id",
            get(companies::show)
                .put(companies::update)
                .delete(companies::remove),
        )
        .route("/api/certificates/company/:id", get(certificates::list))
        .route(
            "/api/certificates/upload/:id",
            post(certificates::upload).layer(upload_limit),
        )
        .route("/api/certificates/:id", delete(certificates::remove))
        .fallback_service(ServeDir::new(web_root))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C, over TLS when the server config carries a key pair.
pub async fn start_webserver(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context(format!("Invalid listen address {}:{}", config.host, config.port))?;
    let app = router(state, &config.web_root);

    let handle = Handle::new();
    tokio::spawn(shutdown_on_ctrl_c(handle.clone()));

    match &config.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .context(format!(
                    "Failed to load TLS certificate {} / key {}",
                    tls.cert_path.display(),
                    tls.key_path.display()
                ))?;
            info!("HTTPS server listening on https://{}", addr);
            info!("Serving static files from {}", config.web_root.display());
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            info!("HTTP server listening on http://{}", addr);
            info!("Serving static files from {}", config.web_root.display());
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }
    Ok(())
}

async fn shutdown_on_ctrl_c(handle: Handle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested, draining connections");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
