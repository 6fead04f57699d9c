use std::env;
use std::sync::Arc;

use herd_sync::config::SyncConfig;
use herd_sync::jobs::{outbox_retention::start_outbox_retention_job, outbox_sync::start_outbox_sync_job};
use herd_sync::services::{
    db_outbox_store::DbOutboxStore, rest_remote_store::RestRemoteStore, sync_queue::SyncQueue,
};
use herd_sync::{app, AppState};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,herd_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let config = SyncConfig::from_env();
    tracing::info!(
        batch_size = config.batch_size,
        max_attempts = config.max_attempts,
        concurrency = config.concurrency,
        retention_days = config.retention_days,
        ordered_stages = config.ordered_stages,
        "Sync configuration loaded"
    );

    let remote_url = env::var("REMOTE_URL").expect("REMOTE_URL must be set");
    let remote_key = env::var("REMOTE_API_KEY").expect("REMOTE_API_KEY must be set");

    let store = Arc::new(DbOutboxStore::new(db.clone()));
    let remote = Arc::new(RestRemoteStore::new(remote_url, remote_key));
    let queue = SyncQueue::new(store, remote, config);

    // Background jobs
    start_outbox_sync_job(db.clone(), queue.clone()).await;
    start_outbox_retention_job(db.clone(), queue.clone()).await;

    let router = app(AppState { sync: queue });

    // Start server
    let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, router).await.expect("Server error");
}
