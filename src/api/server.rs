//! SKC Ledger API Server implementation
//!
//! HTTP REST API server using Axum. Exposes the spreadsheet import/export
//! codec and export downloads.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::config::LedgerConfig;

/// API Server configuration
#[derive(Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub ledger: LedgerConfig,
}

impl AppState {
    pub fn new(ledger: LedgerConfig) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ledger,
        }
    }
}

/// Install the global tracing subscriber; later calls are no-ops
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.ledger.max_upload_bytes;

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Codec endpoints
        .route(
            "/api/v1/projects/:project_id/import",
            post(handlers::import_excel),
        )
        .route(
            "/api/v1/projects/:project_id/export",
            post(handlers::export_excel),
        )
        .route(
            "/api/v1/exports/:export_id/download",
            get(handlers::download_export),
        )
        .route("/api/v1/stats", get(handlers::user_stats))
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: ApiConfig, ledger: LedgerConfig) -> anyhow::Result<()> {
    init_tracing("skc_server=info,skc_ledger=info,tower_http=info");

    let app = build_router(Arc::new(AppState::new(ledger)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SKC Ledger API Server starting on http://{}", addr);
    info!("   Endpoints: /api/v1/projects/:id/import, /api/v1/projects/:id/export, /api/v1/exports/:id/download");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("SKC Ledger API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
