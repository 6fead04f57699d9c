// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use services::sync_queue::SyncQueue;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub sync: SyncQueue,
}

pub mod entities {
    pub mod sync_events;
    pub mod sync_status;
}

pub mod services {
    pub mod outbox_store;
    pub mod db_outbox_store;
    pub mod remote_store;
    pub mod rest_remote_store;
    pub mod event_recorder;
    pub mod batch_planner;
    pub mod batch_executor;
    pub mod sync_pool;
    pub mod queue_inspector;
    pub mod retention;
    pub mod sync_queue;
    pub mod sync_status;
}

pub mod config;
pub mod models;
pub mod handlers;
pub mod jobs;

/// Build the HTTP router over a sync queue
pub fn app(state: AppState) -> Router {
    use handlers::sync;

    Router::new()
        .route("/", get(|| async { "herd-sync" }))
        .route(
            "/api/sync/events",
            get(sync::list_events).post(sync::record_event),
        )
        .route("/api/sync/run", post(sync::run_sync))
        .route("/api/sync/reset", post(sync::reset_exhausted))
        .route("/api/sync/stats", get(sync::get_stats))
        .route("/api/sync/diagnostics", get(sync::get_diagnostics))
        .route("/api/sync/state", get(sync::get_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
