//! Sync status service for tracking background job runs
//!
//! Each job (outbox drain, retention sweep) keeps one row with its last
//! success/attempt, running counters, and the size of its latest run. The
//! retention job also uses it to skip a sweep after a quick restart.

use chrono::{Duration, NaiveDateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::sync_status::{self, Entity as SyncStatus};

/// Job names for tracking sync status
pub mod jobs {
    pub const OUTBOX_SYNC: &str = "outbox_sync";
    pub const OUTBOX_RETENTION: &str = "outbox_retention";
}

/// Default minimum intervals between runs (in seconds)
pub mod intervals {
    pub const OUTBOX_SYNC: i32 = 60; // 1 minute
    pub const OUTBOX_RETENTION: i32 = 86400; // 24 hours
}

/// Size of one job run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: i64,
    pub failed: i64,
}

/// Check if a job should run based on its last successful run
///
/// Returns true if:
/// - No record exists for this job (first run)
/// - Last success was at least min_interval_secs ago
pub async fn should_sync(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let status = SyncStatus::find()
        .filter(sync_status::Column::JobName.eq(job_name))
        .one(db)
        .await?;

    let Some(record) = status else {
        tracing::info!("[{}] First run detected, will sync", job_name);
        return Ok(true);
    };

    let Some(last_success) = record.last_success_at else {
        tracing::info!("[{}] No previous successful run, will sync", job_name);
        return Ok(true);
    };

    let now = Utc::now().naive_utc();
    let elapsed = now.signed_duration_since(last_success);

    if is_due(Some(last_success), record.min_interval_secs as i64, now) {
        tracing::info!(
            "[{}] Last run was {}s ago (min: {}s), will sync",
            job_name,
            elapsed.num_seconds(),
            record.min_interval_secs
        );
        Ok(true)
    } else {
        tracing::info!(
            "[{}] Skipping - last run was {}s ago, next run in {}s",
            job_name,
            elapsed.num_seconds(),
            (Duration::seconds(record.min_interval_secs as i64) - elapsed).num_seconds()
        );
        Ok(false)
    }
}

/// Whether at least `min_interval_secs` have passed since `last_success`
pub fn is_due(last_success: Option<NaiveDateTime>, min_interval_secs: i64, now: NaiveDateTime) -> bool {
    match last_success {
        Some(last) => now.signed_duration_since(last) >= Duration::seconds(min_interval_secs),
        None => true,
    }
}

/// Record a successful run
///
/// `interval_secs` becomes the job's stored minimum interval, so a changed
/// schedule takes effect on the next startup check.
pub async fn record_success(
    db: &DatabaseConnection,
    job_name: &str,
    interval_secs: i32,
    summary: RunSummary,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    record_run(db, job_name, interval_secs, summary, None).await?;
    tracing::debug!(
        "[{}] Recorded successful run ({} processed, {} failed)",
        job_name,
        summary.processed,
        summary.failed
    );
    Ok(())
}

/// Record a failed run
pub async fn record_failure(
    db: &DatabaseConnection,
    job_name: &str,
    error: &str,
    interval_secs: i32,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    record_run(db, job_name, interval_secs, RunSummary::default(), Some(error)).await?;
    tracing::debug!("[{}] Recorded failed run: {}", job_name, error);
    Ok(())
}

async fn record_run(
    db: &DatabaseConnection,
    job_name: &str,
    interval_secs: i32,
    summary: RunSummary,
    error: Option<&str>,
) -> Result<(), sea_orm::DbErr> {
    let now = Utc::now().naive_utc();
    let succeeded = error.is_none();

    let existing = SyncStatus::find()
        .filter(sync_status::Column::JobName.eq(job_name))
        .one(db)
        .await?;

    match existing {
        Some(record) => {
            let success_count = record.success_count;
            let error_count = record.error_count;
            let mut active_model: sync_status::ActiveModel = record.into();
            active_model.last_attempt_at = Set(Some(now));
            active_model.last_error = Set(error.map(str::to_string));
            active_model.last_processed = Set(summary.processed);
            active_model.last_failed = Set(summary.failed);
            active_model.min_interval_secs = Set(interval_secs);
            if succeeded {
                active_model.last_success_at = Set(Some(now));
                active_model.success_count = Set(success_count + 1);
            } else {
                active_model.error_count = Set(error_count + 1);
            }
            active_model.update(db).await?;
        }
        None => {
            let new_record = sync_status::ActiveModel {
                job_name: Set(job_name.to_string()),
                last_success_at: Set(succeeded.then_some(now)),
                last_attempt_at: Set(Some(now)),
                last_error: Set(error.map(str::to_string)),
                success_count: Set(if succeeded { 1 } else { 0 }),
                error_count: Set(if succeeded { 0 } else { 1 }),
                last_processed: Set(summary.processed),
                last_failed: Set(summary.failed),
                min_interval_secs: Set(interval_secs),
                ..Default::default()
            };
            new_record.insert(db).await?;
        }
    }

    Ok(())
}
