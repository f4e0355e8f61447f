//! Interview bot
//!
//! Drives candidates through registration, resume handoff, screening and a
//! timed interview. Each participant session is a pure state machine run by
//! its own runtime task.

mod api;
mod backend;
mod config;
mod db;
mod faq;
mod runtime;
mod state_machine;
mod storage;
mod transport;

use api::{create_router, AppState};
use backend::HttpBackendGateway;
use config::AppConfig;
use db::Database;
use faq::QuickResponder;
use runtime::{Collaborators, DatabaseSessionStore, RuntimeManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storage::HttpBlobStorage;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use transport::WebhookTransport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_bot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;
    let context = config.interview_context()?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    // Collaborators
    let backend = HttpBackendGateway::new(&config.backend_base_url, config.backend_timeout)?;
    let storage = HttpBlobStorage::new(
        config.storage_endpoint.as_deref(),
        config.storage_bucket.as_deref(),
        config.storage_token.as_deref(),
        config.backend_timeout,
    )?;
    let transport = WebhookTransport::new(
        config.transport_outbound_url.as_deref(),
        config.transport_document_url.as_deref(),
        config.backend_timeout,
    )?;
    if config.transport_outbound_url.is_none() {
        tracing::warn!("TRANSPORT_OUTBOUND_URL not set; outbound messages are only logged");
    }

    let collaborators = Collaborators {
        backend: Arc::new(backend),
        storage: Arc::new(storage),
        transport: Arc::new(transport),
        responder: Arc::new(QuickResponder::new(
            config.timing_info.clone(),
            config.contact_info.clone(),
        )),
    };

    let manager = RuntimeManager::new(DatabaseSessionStore::new(db), context, collaborators);

    // Sessions with open slots or in-flight calls pick up where they left off
    let resumed = manager.resume_pending().await?;
    tracing::info!(count = resumed, "Resumed pending sessions");

    let state = AppState::new(manager);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Interview bot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
