//! Concurrency pool for batch execution
//!
//! A fixed number of workers share one cursor into the batch list. Each worker
//! claims the next unclaimed batch, runs it to completion, and claims again
//! until the list is exhausted. Workers are futures joined on the calling
//! task, so "concurrent" means several remote calls in flight at once.

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::services::batch_executor::{BatchExecutor, BatchResult};
use crate::services::batch_planner::Batch;

/// Aggregate over every batch a pool run executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTotals {
    pub processed: usize,
    pub success: usize,
    pub failures: usize,
    pub errors: Vec<String>,
}

impl PoolTotals {
    pub fn absorb(&mut self, result: BatchResult) {
        self.processed += result.success_count + result.failure_count;
        self.success += result.success_count;
        self.failures += result.failure_count;
        self.errors.extend(result.errors);
    }

    pub fn merge(&mut self, other: PoolTotals) {
        self.processed += other.processed;
        self.success += other.success;
        self.failures += other.failures;
        self.errors.extend(other.errors);
    }
}

#[derive(Clone)]
pub struct SyncPool {
    executor: BatchExecutor,
    concurrency: usize,
}

impl SyncPool {
    pub fn new(executor: BatchExecutor, concurrency: usize) -> Self {
        Self {
            executor,
            concurrency: concurrency.max(1),
        }
    }

    /// Execute every batch; returns once all of them have been attempted
    pub async fn run_all(&self, batches: &[Batch]) -> PoolTotals {
        if batches.is_empty() {
            return PoolTotals::default();
        }

        let workers = self.concurrency.min(batches.len());
        let cursor = AtomicUsize::new(0);

        info!(batches = batches.len(), workers, "Running sync batches");

        let results = join_all((0..workers).map(|worker| {
            let cursor = &cursor;
            async move {
                let mut totals = PoolTotals::default();
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(batch) = batches.get(index) else {
                        break;
                    };
                    debug!(
                        worker,
                        batch = index,
                        entity_type = %batch.entity_type,
                        operation = %batch.operation,
                        events = batch.len(),
                        "Worker claimed batch"
                    );
                    let result = self.executor.execute(batch, Utc::now()).await;
                    totals.absorb(result);
                }
                totals
            }
        }))
        .await;

        let mut totals = PoolTotals::default();
        for worker_totals in results {
            totals.merge(worker_totals);
        }
        totals
    }
}
