//! Batch planner
//!
//! Turns the outbox into remote-call-sized work:
//! 1. keep unsynced events, oldest `created_at` first (stable on ties)
//! 2. set aside events that hit the attempt ceiling
//! 3. group the rest by (entity type, operation)
//! 4. slice each group into contiguous batches of at most `batch_size`
//!
//! One batch becomes exactly one remote call. Planning never touches the
//! remote store and never modifies an event.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::entity_type::EntityType;
use crate::models::sync_event::{Operation, SyncEvent};
use crate::services::outbox_store::{OutboxStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Stored tag shared by every event in the batch
    pub entity_type: String,
    pub operation: Operation,
    pub events: Vec<SyncEvent>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Dependency stage; unknown tags fail at execution anyway, so they go first
    fn stage(&self) -> u8 {
        self.entity_type
            .parse::<EntityType>()
            .map(|entity| entity.stage())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub batches: Vec<Batch>,
    /// Unsynced events at or past the attempt ceiling; never batched
    pub exhausted: Vec<SyncEvent>,
}

impl Plan {
    pub fn batched_events(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.exhausted.is_empty()
    }

    /// Split batches into stages that run one after another.
    ///
    /// Unordered: a single stage holding every batch. Ordered: upserts by
    /// ascending dependency stage (parents before the rows that reference
    /// them), then deletes by descending stage (children before parents).
    pub fn into_stages(self, ordered: bool) -> Vec<Vec<Batch>> {
        if !ordered {
            return if self.batches.is_empty() {
                Vec::new()
            } else {
                vec![self.batches]
            };
        }

        let (deletes, upserts): (Vec<Batch>, Vec<Batch>) = self
            .batches
            .into_iter()
            .partition(|batch| batch.operation.is_delete());

        let mut stages = group_by_stage(upserts);
        let mut delete_stages = group_by_stage(deletes);
        delete_stages.reverse();
        stages.extend(delete_stages);
        stages
    }
}

fn group_by_stage(batches: Vec<Batch>) -> Vec<Vec<Batch>> {
    let mut by_stage: Vec<(u8, Vec<Batch>)> = Vec::new();
    for batch in batches {
        let stage = batch.stage();
        match by_stage.iter_mut().find(|(s, _)| *s == stage) {
            Some((_, group)) => group.push(batch),
            None => by_stage.push((stage, vec![batch])),
        }
    }
    by_stage.sort_by_key(|(stage, _)| *stage);
    by_stage.into_iter().map(|(_, group)| group).collect()
}

#[derive(Clone)]
pub struct BatchPlanner {
    store: Arc<dyn OutboxStore>,
    batch_size: usize,
    max_attempts: i32,
}

impl BatchPlanner {
    pub fn new(store: Arc<dyn OutboxStore>, batch_size: usize, max_attempts: i32) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            max_attempts,
        }
    }

    pub async fn plan(&self) -> Result<Plan, StoreError> {
        let events = self.store.all().await?;
        let plan = build_plan(events, self.batch_size, self.max_attempts);

        if !plan.exhausted.is_empty() {
            warn!(
                exhausted = plan.exhausted.len(),
                max_attempts = self.max_attempts,
                "Sync events past the attempt ceiling were left out of the plan"
            );
        }
        debug!(
            batches = plan.batches.len(),
            events = plan.batched_events(),
            "Planned sync batches"
        );
        Ok(plan)
    }
}

pub fn build_plan(events: Vec<SyncEvent>, batch_size: usize, max_attempts: i32) -> Plan {
    let batch_size = batch_size.max(1);

    let mut pending: Vec<SyncEvent> = events.into_iter().filter(|e| !e.synced).collect();
    // sort_by is stable, so equal timestamps keep store insertion order
    pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let (eligible, exhausted): (Vec<SyncEvent>, Vec<SyncEvent>) = pending
        .into_iter()
        .partition(|e| !e.is_exhausted(max_attempts));

    let mut group_index: HashMap<(String, Operation), usize> = HashMap::new();
    let mut groups: Vec<((String, Operation), Vec<SyncEvent>)> = Vec::new();
    for event in eligible {
        let key = (event.entity_type.clone(), event.operation);
        match group_index.get(&key) {
            Some(&index) => groups[index].1.push(event),
            None => {
                group_index.insert(key.clone(), groups.len());
                groups.push((key, vec![event]));
            }
        }
    }

    let mut batches = Vec::new();
    for ((entity_type, operation), mut events) in groups {
        while !events.is_empty() {
            let rest = events.split_off(events.len().min(batch_size));
            batches.push(Batch {
                entity_type: entity_type.clone(),
                operation,
                events,
            });
            events = rest;
        }
    }

    Plan { batches, exhausted }
}
