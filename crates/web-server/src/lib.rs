//! # Matchtally Web Server Crate
//!
//! The JSON HTTP surface of the application, built on `axum`.
//!
//! ## Architectural Principles
//!
//! - **Thin Handlers:** Handlers extract, delegate to the repository, the
//!   analytics engine or the backup service, and serialize. No business rules
//!   live here.
//! - **Explicit State:** Everything a handler needs is in [`AppState`]; the
//!   store is chosen once at startup and passed in.
//! - **Errors as Responses:** Every failure becomes an [`error::AppError`] with
//!   a fixed status mapping and a `{"error": ...}` body.
//!
//! ## Public API
//!
//! - `AppState`: Shared handler state.
//! - `build_router`: The complete route table with middleware.
//! - `run_server`: Connects, migrates and serves until shutdown.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
};
use backup::BackupService;
use configuration::{DatabaseSettings, Settings};
use database::DbRepository;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

// Declare the modules that make up this crate.
pub mod auth;
pub mod error;
pub mod handlers;

/// The shared application state that all handlers can access.
pub struct AppState {
    pub repo: DbRepository,
    pub backup: BackupService,
    pub sessions: auth::SessionStore,
    pub setup_token: Option<String>,
}

impl AppState {
    pub fn new(repo: DbRepository, backup: BackupService, setup_token: Option<String>) -> Self {
        Self {
            repo,
            backup,
            sessions: auth::SessionStore::new(),
            setup_token,
        }
    }

    pub fn with_session_idle_timeout(mut self, idle: Duration) -> Self {
        self.sessions = auth::SessionStore::with_idle_timeout(idle);
        self
    }
}

/// Builds the route table.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route(
            "/api/results",
            get(handlers::list_results).post(handlers::create_result),
        )
        .route("/api/results/delete", post(handlers::delete_results))
        .route(
            "/api/results/:id",
            get(handlers::get_result)
                .patch(handlers::update_result)
                .delete(handlers::delete_result),
        )
        .route("/api/report", get(handlers::report))
        .route(
            "/api/decks/:side",
            get(handlers::list_decks).post(handlers::create_deck),
        )
        .route(
            "/api/decks/:side/:id",
            patch(handlers::update_deck).delete(handlers::delete_deck),
        )
        .route(
            "/api/backup/database",
            get(handlers::export_database).post(handlers::restore_database),
        )
        .route("/api/setup/restore", post(handlers::setup_restore))
        .route(
            "/api/backup/user-data",
            get(handlers::export_user_data).post(handlers::import_user_data),
        )
        .with_state(state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Connects to the configured store, applies migrations and serves the API
/// until the process is stopped.
pub async fn run_server(settings: &Settings) -> anyhow::Result<()> {
    let store = DatabaseSettings::from_env(&settings.database)?;
    tracing::info!(store = %store.describe(), "Using relational store.");

    let db = Arc::new(database::connect(&store, settings.database.max_connections).await?);
    database::run_migrations(&db).await?;

    let state = AppState::new(
        DbRepository::new(db.clone()),
        BackupService::new(db, settings.backup.assets.clone())
            .with_max_database_bytes(settings.backup.max_database_bytes),
        settings.server.setup_token.clone(),
    )
    .with_session_idle_timeout(Duration::from_secs(settings.server.session_idle_minutes * 60));
    let state = Arc::new(state);
    if state.setup_token.is_some() {
        tracing::info!("Setup restore endpoint is enabled.");
    }
    let app = build_router(state, settings.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    tracing::info!("Web server started and listening on {}", settings.server.addr);
    axum::serve(listener, app).await?;

    Ok(())
}
