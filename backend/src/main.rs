//! Doc Vault - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use doc_vault_backend::{
    api,
    config::Config,
    db,
    error::Result,
    repositories::Repositories,
    storage::{filesystem::FilesystemStorage, StorageBackend},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(&config.log_level);
    tracing::info!(config = ?config, "Starting Doc Vault");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    db::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    let storage = FilesystemStorage::new(&config.storage_path);
    storage.init().await?;
    let storage: Arc<dyn StorageBackend> = Arc::new(storage);
    tracing::info!(path = %config.storage_path, "File storage ready");

    let addr: SocketAddr = config.bind_address.parse()?;
    let state = Arc::new(api::AppState::new(
        config,
        Repositories::postgres(db_pool),
        storage,
    ));

    // Build router
    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
