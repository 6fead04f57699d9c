//! Outbox Retention Sweep
//!
//! Removes synced events once they are older than the retention window:
//! - only `synced` events are candidates
//! - age is measured from `updated_at` (the successful attempt)
//! - events with an unreadable `updated_at` are kept

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::sync_event::{parse_timestamp, SyncEvent};
use crate::services::outbox_store::{OutboxStore, StoreError};

/// Statistics from a sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionStats {
    pub scanned: usize,
    pub removed: u64,
}

#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn OutboxStore>,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn OutboxStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention: Duration::days(retention_days),
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<RetentionStats, StoreError> {
        let cutoff = now - self.retention;
        let events = self.store.all().await?;

        let expired: Vec<String> = events
            .iter()
            .filter(|e| is_expired(e, cutoff))
            .map(|e| e.id.clone())
            .collect();

        let mut stats = RetentionStats {
            scanned: events.len(),
            removed: 0,
        };

        if expired.is_empty() {
            debug!(cutoff = %cutoff, "No synced events past retention");
            return Ok(stats);
        }

        stats.removed = self.store.bulk_delete(expired).await?;
        info!(
            removed = stats.removed,
            scanned = stats.scanned,
            cutoff = %cutoff,
            "Swept synced events past retention"
        );
        Ok(stats)
    }
}

fn is_expired(event: &SyncEvent, cutoff: DateTime<Utc>) -> bool {
    event.synced
        && parse_timestamp(&event.updated_at)
            .map(|updated| updated < cutoff)
            .unwrap_or(false)
}
