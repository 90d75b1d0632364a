use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fcm_device_registry::{
    build_app,
    config::{Config, StorageBackend},
    storage::{DeviceStore, MemoryDeviceStore, PgDeviceStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fcm_device_registry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load();
    tracing::info!("Starting server in {} mode", config.server.environment);

    // Initialize device store
    let store: Arc<dyn DeviceStore> = match config.storage {
        StorageBackend::Postgres => {
            let db = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(&config.database_url())
                .await?;
            tracing::info!("Connected to PostgreSQL");

            // Run migrations
            sqlx::migrate!("./migrations").run(&db).await?;
            tracing::info!("Database migrations completed");

            Arc::new(PgDeviceStore::new(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory device store; registrations are not persisted");
            Arc::new(MemoryDeviceStore::new())
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Build router
    let app = build_app(AppState::new(store, config));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
