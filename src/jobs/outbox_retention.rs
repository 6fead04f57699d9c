//! Outbox Retention Job
//!
//! Sweeps synced outbox events past the retention window once a day.
//! The `sync_status` gate applies only at startup, so a quick restart does not
//! sweep twice; every later tick sweeps.

use sea_orm::DatabaseConnection;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::services::sync_queue::SyncQueue;
use crate::services::sync_status::{self, intervals, jobs, RunSummary};

type StatusCheck = Result<bool, Box<dyn std::error::Error + Send + Sync>>;

/// Start the outbox retention job
///
/// Ticks every `SyncConfig::retention_interval_secs`
/// (`SYNC_RETENTION_INTERVAL_SECS`, default 24 hours).
pub async fn start_outbox_retention_job(db: DatabaseConnection, queue: SyncQueue) {
    tokio::spawn(async move {
        let interval_secs = queue.config().retention_interval_secs;
        info!(
            interval_secs,
            retention_days = queue.config().retention_days,
            "Outbox retention job started"
        );

        let mut ticker = interval(Duration::from_secs(interval_secs));
        // First tick completes immediately
        ticker.tick().await;

        let status = sync_status::should_sync(&db, jobs::OUTBOX_RETENTION).await;
        if let Err(e) = &status {
            warn!("Failed to check sync status, sweeping anyway: {}", e);
        }
        if sweep_at_startup(&status) {
            sweep(&db, &queue).await;
        } else {
            info!("Skipping outbox sweep on startup (recently swept)");
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping outbox retention job gracefully");
                    break;
                }
                _ = ticker.tick() => {
                    sweep(&db, &queue).await;
                }
            }
        }

        info!("Outbox retention job stopped");
    });
}

/// Only a confirmed recent sweep skips the startup run
fn sweep_at_startup(status: &StatusCheck) -> bool {
    !matches!(status, Ok(false))
}

async fn sweep(db: &DatabaseConnection, queue: &SyncQueue) {
    match queue.sweep().await {
        Ok(stats) => {
            let summary = RunSummary {
                processed: stats.removed as i64,
                failed: 0,
            };
            if let Err(e) = sync_status::record_success(
                db,
                jobs::OUTBOX_RETENTION,
                interval_secs(queue),
                summary,
            )
            .await
            {
                warn!("Failed to record sweep success: {}", e);
            }
        }
        Err(e) => {
            error!(error = %e, "Outbox retention sweep failed");
            if let Err(e2) = sync_status::record_failure(
                db,
                jobs::OUTBOX_RETENTION,
                &e.to_string(),
                interval_secs(queue),
            )
            .await
            {
                warn!("Failed to record sweep failure: {}", e2);
            }
        }
    }
}

/// Configured interval as stored in `sync_status`
fn interval_secs(queue: &SyncQueue) -> i32 {
    i32::try_from(queue.config().retention_interval_secs).unwrap_or(intervals::OUTBOX_RETENTION)
}
