//! Outbox Sync Job
//!
//! Drains the outbox on a fixed interval. Supports graceful shutdown via
//! SIGINT. Each run is recorded in `sync_status`.

use sea_orm::DatabaseConnection;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::services::sync_queue::{SyncQueue, SyncQueueError};
use crate::services::sync_status::{self, intervals, jobs, RunSummary};

/// Start the outbox sync job
///
/// Spawns a background task that drains the outbox every
/// `SyncConfig::sync_interval_secs` (`SYNC_INTERVAL_SECS`, default 60).
/// A tick that finds a run already in progress (for example one started
/// through the API) is skipped.
pub async fn start_outbox_sync_job(db: DatabaseConnection, queue: SyncQueue) {
    tokio::spawn(async move {
        let interval_secs = queue.config().sync_interval_secs;
        info!(interval_secs, "Outbox sync job started");

        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping outbox sync job gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    run_once(&db, &queue).await;
                }
            }
        }

        info!("Outbox sync job stopped");
    });
}

async fn run_once(db: &DatabaseConnection, queue: &SyncQueue) {
    match queue.run().await {
        Ok(result) => {
            if result.processed == 0 {
                return;
            }
            let summary = RunSummary {
                processed: result.processed as i64,
                failed: result.failures as i64,
            };
            if let Err(e) =
                sync_status::record_success(db, jobs::OUTBOX_SYNC, intervals::OUTBOX_SYNC, summary)
                    .await
            {
                warn!("Failed to record sync success: {}", e);
            }
        }
        Err(SyncQueueError::AlreadyRunning) => {
            info!("Outbox sync already running, skipping tick");
        }
        Err(e) => {
            error!(error = %e, "Outbox sync failed");
            if let Err(e2) = sync_status::record_failure(
                db,
                jobs::OUTBOX_SYNC,
                &e.to_string(),
                intervals::OUTBOX_SYNC,
            )
            .await
            {
                warn!("Failed to record sync failure: {}", e2);
            }
        }
    }
}
