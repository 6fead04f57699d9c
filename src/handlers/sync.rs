//! Sync Handlers
//!
//! Endpoints over the outbox sync queue:
//! - POST /api/sync/events      record one local mutation
//! - POST /api/sync/run         drain the outbox now
//! - POST /api/sync/reset       re-arm events that hit the attempt ceiling
//! - GET  /api/sync/stats       counts by status, operation and entity type
//! - GET  /api/sync/diagnostics corrupt or unmapped rows
//! - GET  /api/sync/state       current/last run
//! - GET  /api/sync/events      list events by status

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info, warn};

use crate::models::sync::{
    ListEventsQuery, ListEventsResponse, RecordEventRequest, RecordEventResponse, ResetResponse,
    SyncErrorResponse,
};
use crate::services::outbox_store::StoreError;
use crate::services::queue_inspector::{QueueDiagnostics, QueueStats};
use crate::services::sync_queue::{SyncQueueError, SyncRunResult, SyncState};
use crate::AppState;

type ApiError = (StatusCode, Json<SyncErrorResponse>);

fn bad_request(error: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(SyncErrorResponse { error }))
}

fn store_failure(context: &str, e: StoreError) -> ApiError {
    error!(error = %e, "{}", context);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(SyncErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Record an outbox event
///
/// POST /api/sync/events
///
/// ```json
/// {
///   "operation": "INSERT",
///   "entityType": "weighing",
///   "targetId": "5f0c...",
///   "payload": { "uuid": "5f0c...", "animal_uuid": "...", "weight": 412.5 }
/// }
/// ```
///
/// DELETE bodies may carry `remoteId` when the row already reached the remote.
pub async fn record_event(
    State(state): State<AppState>,
    Json(request): Json<RecordEventRequest>,
) -> Result<(StatusCode, Json<RecordEventResponse>), ApiError> {
    let valid = request.validate().map_err(|e| {
        warn!(error = %e, "Invalid sync event");
        bad_request(e)
    })?;

    let recorded = if valid.operation.is_delete() {
        state
            .sync
            .record_delete(valid.entity_type, &request.target_id, request.remote_id.as_deref())
            .await
    } else {
        state
            .sync
            .record(
                valid.operation,
                valid.entity_type,
                &request.target_id,
                request.payload.as_ref(),
            )
            .await
    };

    let id = recorded.map_err(|e| store_failure("Failed to record sync event", e))?;
    Ok((StatusCode::CREATED, Json(RecordEventResponse { id })))
}

/// Drain the outbox
///
/// POST /api/sync/run
///
/// Returns the run result; 409 when a run is already in progress.
pub async fn run_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncRunResult>, ApiError> {
    info!("Sync run requested");

    match state.sync.run().await {
        Ok(result) => Ok(Json(result)),
        Err(SyncQueueError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(SyncErrorResponse {
                error: SyncQueueError::AlreadyRunning.to_string(),
            }),
        )),
        Err(SyncQueueError::Store(e)) => Err(store_failure("Sync run failed", e)),
    }
}

/// POST /api/sync/reset
pub async fn reset_exhausted(
    State(state): State<AppState>,
) -> Result<Json<ResetResponse>, ApiError> {
    let reset = state
        .sync
        .reset_exhausted()
        .await
        .map_err(|e| store_failure("Failed to reset sync events", e))?;
    Ok(Json(ResetResponse { reset }))
}

/// GET /api/sync/stats
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    state
        .sync
        .stats()
        .await
        .map(Json)
        .map_err(|e| store_failure("Failed to read sync stats", e))
}

/// GET /api/sync/diagnostics
pub async fn get_diagnostics(
    State(state): State<AppState>,
) -> Result<Json<QueueDiagnostics>, ApiError> {
    state
        .sync
        .diagnostics()
        .await
        .map(Json)
        .map_err(|e| store_failure("Failed to read sync diagnostics", e))
}

/// GET /api/sync/state
pub async fn get_state(State(state): State<AppState>) -> Json<SyncState> {
    Json(state.sync.state())
}

/// List events
///
/// GET /api/sync/events?status=failed&limit=20
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<ListEventsResponse>, ApiError> {
    let (filter, limit) = query.validate().map_err(|e| {
        warn!(error = %e, "Invalid query parameters");
        bad_request(e)
    })?;

    let events = state
        .sync
        .list_events(filter, limit)
        .await
        .map_err(|e| store_failure("Failed to list sync events", e))?;

    Ok(Json(ListEventsResponse {
        count: events.len(),
        events,
    }))
}
