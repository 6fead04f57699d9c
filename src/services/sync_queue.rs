//! Sync queue
//!
//! Ties the outbox pieces together behind one handle: recording, draining
//! (plan, then run each stage through the pool), inspection, retention and
//! reset. Run state is an explicit value readable with [`SyncQueue::state`];
//! observers subscribe to [`SyncNotification`]s instead of polling a flag.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::models::entity_type::EntityType;
use crate::models::sync_event::{format_timestamp, EventChanges, Operation, SyncEvent};
use crate::services::batch_executor::BatchExecutor;
use crate::services::batch_planner::BatchPlanner;
use crate::services::event_recorder::EventRecorder;
use crate::services::outbox_store::{OutboxStore, StoreError};
use crate::services::queue_inspector::{EventFilter, QueueDiagnostics, QueueInspector, QueueStats};
use crate::services::remote_store::RemoteStore;
use crate::services::retention::{RetentionStats, RetentionSweeper};
use crate::services::sync_pool::{PoolTotals, SyncPool};

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum SyncQueueError {
    AlreadyRunning,
    Store(StoreError),
}

impl std::fmt::Display for SyncQueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncQueueError::AlreadyRunning => write!(f, "A sync run is already in progress"),
            SyncQueueError::Store(e) => write!(f, "Outbox error: {}", e),
        }
    }
}

impl std::error::Error for SyncQueueError {}

impl From<StoreError> for SyncQueueError {
    fn from(err: StoreError) -> Self {
        SyncQueueError::Store(err)
    }
}

/// What one drain did, event by event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub processed: usize,
    pub success: usize,
    pub failures: usize,
    pub errors: Vec<String>,
    /// Events skipped because they already reached the attempt ceiling
    pub abandoned: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub in_progress: bool,
    pub last_started_at: Option<String>,
    pub last_finished_at: Option<String>,
    pub last_result: Option<SyncRunResult>,
    pub last_error: Option<String>,
    pub run_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncNotification {
    Started { at: String },
    Finished { at: String, result: SyncRunResult },
    Failed { at: String, error: String },
}

#[derive(Clone)]
pub struct SyncQueue {
    config: SyncConfig,
    store: Arc<dyn OutboxStore>,
    recorder: EventRecorder,
    planner: BatchPlanner,
    pool: SyncPool,
    inspector: QueueInspector,
    sweeper: RetentionSweeper,
    state: Arc<RwLock<SyncState>>,
    run_lock: Arc<Mutex<()>>,
    notifier: broadcast::Sender<SyncNotification>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn OutboxStore>, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        let executor = BatchExecutor::new(store.clone(), remote);
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            recorder: EventRecorder::new(store.clone()),
            planner: BatchPlanner::new(store.clone(), config.batch_size, config.max_attempts),
            pool: SyncPool::new(executor, config.concurrency),
            inspector: QueueInspector::new(store.clone(), config.max_attempts),
            sweeper: RetentionSweeper::new(store.clone(), config.retention_days),
            store,
            config,
            state: Arc::new(RwLock::new(SyncState::default())),
            run_lock: Arc::new(Mutex::new(())),
            notifier,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifier.subscribe()
    }

    pub async fn record(
        &self,
        operation: Operation,
        entity_type: EntityType,
        target_id: &str,
        payload: Option<&Value>,
    ) -> Result<String, StoreError> {
        self.recorder
            .record(operation, entity_type, target_id, payload)
            .await
    }

    pub async fn record_delete(
        &self,
        entity_type: EntityType,
        target_id: &str,
        remote_id: Option<&str>,
    ) -> Result<String, StoreError> {
        self.recorder
            .record_delete(entity_type, target_id, remote_id)
            .await
    }

    /// Drain the outbox once
    ///
    /// Remote failures end up in the returned result; only a second
    /// concurrent call or a failure to read the outbox is an error.
    pub async fn run(&self) -> Result<SyncRunResult, SyncQueueError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| SyncQueueError::AlreadyRunning)?;

        let started_at = format_timestamp(Utc::now());
        {
            let mut state = self.state.write();
            state.in_progress = true;
            state.last_started_at = Some(started_at.clone());
        }
        // No subscribers is fine
        let _ = self.notifier.send(SyncNotification::Started { at: started_at });

        let outcome = self.drain().await;

        let finished_at = format_timestamp(Utc::now());
        {
            let mut state = self.state.write();
            state.in_progress = false;
            state.last_finished_at = Some(finished_at.clone());
            state.run_count += 1;
            match &outcome {
                Ok(result) => {
                    state.last_result = Some(result.clone());
                    state.last_error = None;
                }
                Err(e) => state.last_error = Some(e.to_string()),
            }
        }

        let notification = match &outcome {
            Ok(result) => SyncNotification::Finished {
                at: finished_at,
                result: result.clone(),
            },
            Err(e) => SyncNotification::Failed {
                at: finished_at,
                error: e.to_string(),
            },
        };
        let _ = self.notifier.send(notification);

        outcome
    }

    async fn drain(&self) -> Result<SyncRunResult, SyncQueueError> {
        let plan = self.planner.plan().await?;
        let abandoned = plan.exhausted.len();
        let batches = plan.batches.len();

        let mut totals = PoolTotals::default();
        for stage in plan.into_stages(self.config.ordered_stages) {
            totals.merge(self.pool.run_all(&stage).await);
        }

        // Abandoned events count as handled and failed, without an attempt
        totals.processed += abandoned;
        totals.failures += abandoned;
        if abandoned > 0 {
            totals.errors.push(format!(
                "{} events reached the limit of {} attempts and were skipped",
                abandoned, self.config.max_attempts
            ));
        }

        let result = SyncRunResult {
            processed: totals.processed,
            success: totals.success,
            failures: totals.failures,
            errors: totals.errors,
            abandoned,
            batches,
        };

        if result.failures > 0 {
            warn!(
                processed = result.processed,
                success = result.success,
                failures = result.failures,
                abandoned = result.abandoned,
                "Sync run finished with failures"
            );
        } else {
            info!(
                processed = result.processed,
                success = result.success,
                batches = result.batches,
                "Sync run finished"
            );
        }

        Ok(result)
    }

    /// Give abandoned events a fresh set of attempts; returns how many
    pub async fn reset_exhausted(&self) -> Result<usize, StoreError> {
        let now = format_timestamp(Utc::now());
        let updates: Vec<(String, EventChanges)> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|e| !e.synced && e.is_exhausted(self.config.max_attempts))
            .map(|e| {
                (
                    e.id,
                    EventChanges {
                        attempt_count: Some(0),
                        last_error: Some(None),
                        synced: None,
                        updated_at: Some(now.clone()),
                    },
                )
            })
            .collect();

        let count = updates.len();
        if count > 0 {
            self.store.bulk_update(updates).await?;
            info!(reset = count, "Reset abandoned sync events");
        }
        Ok(count)
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        self.inspector.stats().await
    }

    pub async fn diagnostics(&self) -> Result<QueueDiagnostics, StoreError> {
        self.inspector.diagnostics().await
    }

    pub async fn list_events(
        &self,
        filter: EventFilter,
        limit: usize,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        self.inspector.list_events(filter, limit).await
    }

    pub async fn sweep(&self) -> Result<RetentionStats, StoreError> {
        self.sweeper.sweep(Utc::now()).await
    }
}
