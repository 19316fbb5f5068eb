use std::{net::SocketAddr, sync::Arc};

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wellness_admin::{
    AppState,
    config::{AppConfig, Env, StoreBackend},
    create_router,
    directory::{DirectoryState, PostgresDirectory},
    memory::{MemoryDirectory, MemoryRepository},
    repository::{PostgresRepository, RepositoryState},
    storage::{MockStorageService, S3StorageClient, StorageService, StorageState},
};

/// main
///
/// Loads configuration, sets up logging, connects the stores and object storage, then
/// serves the admin API.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise debug for this crate.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wellness_admin=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(
        "Application starting in {:?} mode with {:?} stores",
        config.env,
        config.store_backend
    );

    // 3. Stores.
    let (repo, directory, storage): (RepositoryState, DirectoryState, StorageState) =
        match config.store_backend {
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory stores; data is lost on restart");
                (
                    Arc::new(MemoryRepository::new()),
                    Arc::new(MemoryDirectory::new()),
                    Arc::new(MockStorageService::new()),
                )
            }
            StoreBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(&config.db_url)
                    .await
                    .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .expect("FATAL: Database migrations failed.");

                let provider_pool = if config.provider_db_url == config.db_url {
                    pool.clone()
                } else {
                    PgPoolOptions::new()
                        .max_connections(5)
                        .connect(&config.provider_db_url)
                        .await
                        .expect("FATAL: Failed to connect to the provider directory database.")
                };

                // 4. Object storage (S3 in production, MinIO locally).
                let s3_client = S3StorageClient::new(
                    &config.s3_endpoint,
                    &config.s3_region,
                    &config.s3_key,
                    &config.s3_secret,
                    &config.s3_bucket,
                )
                .await;
                if config.env == Env::Local {
                    s3_client.ensure_bucket_exists().await;
                }

                (
                    Arc::new(PostgresRepository::new(pool)),
                    Arc::new(PostgresDirectory::new(provider_pool)),
                    Arc::new(s3_client),
                )
            }
        };

    // 5. Unified state and router.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(config, repo, directory, storage));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    // Peer addresses back the allow-list when no proxy header is trusted.
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        tracing::error!(error = %e, "HTTP server terminated");
    }
}
