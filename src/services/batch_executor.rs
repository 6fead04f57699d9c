//! Batch executor
//!
//! Runs one planned batch against the remote store with a single call and
//! writes the outcome back to the outbox:
//! - DELETE: events without a remote id are settled locally; the rest go out
//!   as one delete-by-ids call
//! - INSERT/UPDATE: payloads are parsed into rows and sent as one upsert keyed
//!   by the entity's natural key; unparsable payloads fail on their own
//!
//! Every event in the batch gets exactly one attempt recorded, success or
//! not. Remote and storage failures are folded into the returned result and
//! never escape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::models::entity_type::EntityType;
use crate::models::sync_event::{EventChanges, Operation, SyncEvent};
use crate::services::batch_planner::Batch;
use crate::services::outbox_store::OutboxStore;
use crate::services::remote_store::{RemoteStore, Row};

pub const INVALID_PAYLOAD: &str = "invalid payload";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct BatchExecutor {
    store: Arc<dyn OutboxStore>,
    remote: Arc<dyn RemoteStore>,
}

/// Outcomes collected while running a batch, written back in one bulk update
struct Settlement {
    now: DateTime<Utc>,
    updates: Vec<(String, EventChanges)>,
    result: BatchResult,
}

impl Settlement {
    fn new(now: DateTime<Utc>, capacity: usize) -> Self {
        Self {
            now,
            updates: Vec::with_capacity(capacity),
            result: BatchResult::default(),
        }
    }

    fn succeed(&mut self, event: &SyncEvent) {
        self.updates
            .push((event.id.clone(), EventChanges::attempted(event, self.now, Ok(()))));
        self.result.success_count += 1;
    }

    fn fail(&mut self, event: &SyncEvent, message: &str) {
        self.updates.push((
            event.id.clone(),
            EventChanges::attempted(event, self.now, Err(message.to_string())),
        ));
        self.result.failure_count += 1;
    }

    fn note(&mut self, error: String) {
        self.result.errors.push(error);
    }
}

/// Row sent to the remote, or `None` when the payload is missing, not JSON,
/// not an object, or an empty object
fn parse_row(payload: &str) -> Option<Row> {
    if payload.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(row)) if !row.is_empty() => Some(row),
        _ => None,
    }
}

impl BatchExecutor {
    pub fn new(store: Arc<dyn OutboxStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self { store, remote }
    }

    pub async fn execute(&self, batch: &Batch, now: DateTime<Utc>) -> BatchResult {
        let mut settlement = Settlement::new(now, batch.len());

        match batch.entity_type.parse::<EntityType>() {
            Ok(entity) => match batch.operation {
                Operation::Delete => self.delete(entity, &batch.events, &mut settlement).await,
                Operation::Insert | Operation::Update => {
                    self.upsert(entity, batch.operation, &batch.events, &mut settlement)
                        .await
                }
            },
            Err(_) => {
                let message = format!(
                    "no remote table mapping for entity type '{}'",
                    batch.entity_type
                );
                error!(
                    entity_type = %batch.entity_type,
                    events = batch.len(),
                    "Sync batch has no remote table mapping"
                );
                for event in &batch.events {
                    settlement.fail(event, &message);
                }
                settlement.note(message);
            }
        }

        self.write_back(settlement).await
    }

    async fn delete(&self, entity: EntityType, events: &[SyncEvent], settlement: &mut Settlement) {
        let (local_only, remote): (Vec<&SyncEvent>, Vec<&SyncEvent>) =
            events.iter().partition(|e| e.remote_id.is_none());

        // Never reached the remote, so there is nothing to delete there
        for event in &local_only {
            settlement.succeed(event);
        }

        if remote.is_empty() {
            return;
        }

        let ids: Vec<String> = remote.iter().filter_map(|e| e.remote_id.clone()).collect();
        match self.remote.delete_by_ids(entity.remote_table(), ids).await {
            Ok(()) => {
                debug!(
                    table = entity.remote_table(),
                    deleted = remote.len(),
                    "Remote delete succeeded"
                );
                for event in &remote {
                    settlement.succeed(event);
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    table = entity.remote_table(),
                    events = remote.len(),
                    error = %message,
                    "Remote delete failed"
                );
                for event in &remote {
                    settlement.fail(event, &message);
                }
                settlement.note(format!("{} DELETE ({} events): {}", entity, remote.len(), message));
            }
        }
    }

    async fn upsert(
        &self,
        entity: EntityType,
        operation: Operation,
        events: &[SyncEvent],
        settlement: &mut Settlement,
    ) {
        let mut rows = Vec::with_capacity(events.len());
        let mut included = Vec::with_capacity(events.len());

        for event in events {
            match parse_row(&event.payload) {
                Some(row) => {
                    rows.push(row);
                    included.push(event);
                }
                None => {
                    settlement.fail(event, INVALID_PAYLOAD);
                    settlement.note(format!("{} {} event {}: {}", entity, operation, event.id, INVALID_PAYLOAD));
                }
            }
        }

        if rows.is_empty() {
            return;
        }

        let conflict_field = entity.natural_key().column();
        match self
            .remote
            .upsert(entity.remote_table(), rows, conflict_field)
            .await
        {
            Ok(()) => {
                debug!(
                    table = entity.remote_table(),
                    rows = included.len(),
                    conflict_field,
                    "Remote upsert succeeded"
                );
                for event in &included {
                    settlement.succeed(event);
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    table = entity.remote_table(),
                    events = included.len(),
                    error = %message,
                    "Remote upsert failed"
                );
                for event in &included {
                    settlement.fail(event, &message);
                }
                settlement.note(format!(
                    "{} {} ({} events): {}",
                    entity,
                    operation,
                    included.len(),
                    message
                ));
            }
        }
    }

    async fn write_back(&self, settlement: Settlement) -> BatchResult {
        let Settlement {
            updates, mut result, ..
        } = settlement;

        if let Err(e) = self.store.bulk_update(updates).await {
            // The remote may have applied the call; the events stay pending and
            // the next run repeats it, which the idempotent remote tolerates.
            error!(error = %e, "Failed to record sync outcome in the outbox");
            result.failure_count += result.success_count;
            result.success_count = 0;
            result.errors.push(format!("failed to record sync outcome: {}", e));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::batch_planner::build_plan;
    use crate::services::outbox_store::{MemoryOutboxStore, StoreError};
    use crate::services::remote_store::MemoryRemoteStore;
    use serde_json::json;

    struct Harness {
        store: MemoryOutboxStore,
        remote: MemoryRemoteStore,
        executor: BatchExecutor,
    }

    fn harness() -> Harness {
        let store = MemoryOutboxStore::new();
        let remote = MemoryRemoteStore::new();
        let executor = BatchExecutor::new(Arc::new(store.clone()), Arc::new(remote.clone()));
        Harness {
            store,
            remote,
            executor,
        }
    }

    fn event(entity: EntityType, operation: Operation, payload: &str) -> SyncEvent {
        SyncEvent::new(operation, entity, "t", payload.to_string(), None, Utc::now())
    }

    async fn batches(store: &MemoryOutboxStore) -> Vec<Batch> {
        build_plan(store.all().await.unwrap(), 50, 5).batches
    }

    #[tokio::test]
    async fn test_120_weighings_all_synced() {
        let h = harness();
        for i in 0..120 {
            let payload = json!({"uuid": format!("w-{}", i), "weight": 300 + i}).to_string();
            h.store
                .add(event(EntityType::Weighing, Operation::Insert, &payload))
                .await
                .unwrap();
        }

        let mut success = 0;
        for batch in batches(&h.store).await {
            let result = h.executor.execute(&batch, Utc::now()).await;
            assert_eq!(result.failure_count, 0);
            success += result.success_count;
        }

        assert_eq!(success, 120);
        assert_eq!(h.remote.upsert_calls(), 3);
        assert_eq!(h.remote.rows("weighings").len(), 120);
        let events = h.store.all().await.unwrap();
        assert!(events.iter().all(|e| e.synced && e.attempt_count == 1 && e.last_error.is_none()));
    }

    #[tokio::test]
    async fn test_delete_without_remote_id_settles_locally() {
        let h = harness();
        h.store
            .add(event(EntityType::Vaccination, Operation::Delete, ""))
            .await
            .unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;

        assert_eq!(result.success_count, 1);
        assert_eq!(h.remote.delete_calls(), 0);
        let stored = h.store.all().await.unwrap().remove(0);
        assert!(stored.synced);
        assert_eq!(stored.attempt_count, 1);
    }

    #[tokio::test]
    async fn test_delete_with_remote_ids_is_one_call() {
        let h = harness();
        for id in ["10", "11"] {
            let mut e = event(EntityType::Farm, Operation::Delete, "");
            e.remote_id = Some(id.to_string());
            h.store.add(e).await.unwrap();
        }
        h.store
            .add(event(EntityType::Farm, Operation::Delete, ""))
            .await
            .unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.success_count, 3);
        assert_eq!(h.remote.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_marks_whole_call() {
        let h = harness();
        h.remote.fail_table("farms");
        for id in ["10", "11"] {
            let mut e = event(EntityType::Farm, Operation::Delete, "");
            e.remote_id = Some(id.to_string());
            h.store.add(e).await.unwrap();
        }
        h.store
            .add(event(EntityType::Farm, Operation::Delete, ""))
            .await
            .unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 2);
        assert_eq!(result.errors.len(), 1);

        let events = h.store.all().await.unwrap();
        for e in events.iter().filter(|e| e.remote_id.is_some()) {
            assert!(!e.synced);
            assert_eq!(e.attempt_count, 1);
            assert!(e.last_error.as_deref().unwrap().contains("503"));
        }
    }

    #[tokio::test]
    async fn test_empty_object_payload_is_invalid() {
        let h = harness();
        h.store
            .add(event(EntityType::Breed, Operation::Update, "{}"))
            .await
            .unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(h.remote.upsert_calls(), 0);

        let stored = h.store.all().await.unwrap().remove(0);
        assert!(!stored.synced);
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some(INVALID_PAYLOAD));
    }

    #[tokio::test]
    async fn test_invalid_payloads_do_not_block_valid_rows() {
        let h = harness();
        for payload in ["", "not json", "[1,2]", r#"{"uuid":"b-1","name":"Nelore"}"#] {
            h.store
                .add(event(EntityType::Breed, Operation::Insert, payload))
                .await
                .unwrap();
        }

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 3);
        assert_eq!(h.remote.upsert_calls(), 1);
        assert_eq!(h.remote.rows("breeds").len(), 1);
    }

    #[tokio::test]
    async fn test_admin_entities_upsert_on_id() {
        let h = harness();
        h.store
            .add(event(EntityType::User, Operation::Update, r#"{"id":"u-1","name":"Ana"}"#))
            .await
            .unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.success_count, 1);
        assert_eq!(h.remote.rows("users")[0]["id"], json!("u-1"));
    }

    #[tokio::test]
    async fn test_unmapped_entity_fails_without_remote_call() {
        let h = harness();
        let mut e = event(EntityType::Farm, Operation::Insert, r#"{"uuid":"x"}"#);
        e.entity_type = "pasture".to_string();
        h.store.add(e).await.unwrap();

        let batch = batches(&h.store).await.remove(0);
        let result = h.executor.execute(&batch, Utc::now()).await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(h.remote.upsert_calls(), 0);
        assert!(result.errors[0].contains("pasture"));

        let stored = h.store.all().await.unwrap().remove(0);
        assert_eq!(stored.attempt_count, 1);
        assert!(stored.last_error.unwrap().contains("no remote table mapping"));
    }

    #[tokio::test]
    async fn test_mixed_entities_fail_independently() {
        let h = harness();
        h.remote.fail_table(EntityType::Vaccination.remote_table());
        for i in 0..10 {
            let v = json!({"uuid": format!("v-{}", i)}).to_string();
            let w = json!({"uuid": format!("w-{}", i)}).to_string();
            h.store
                .add(event(EntityType::Vaccination, Operation::Insert, &v))
                .await
                .unwrap();
            h.store
                .add(event(EntityType::Weighing, Operation::Insert, &w))
                .await
                .unwrap();
        }

        for batch in batches(&h.store).await {
            h.executor.execute(&batch, Utc::now()).await;
        }

        let events = h.store.all().await.unwrap();
        let vaccinations: Vec<&SyncEvent> = events
            .iter()
            .filter(|e| e.entity_type == "vaccination")
            .collect();
        let first_error = vaccinations[0].last_error.clone();
        assert!(first_error.is_some());
        for e in &vaccinations {
            assert!(!e.synced);
            assert_eq!(e.attempt_count, 1);
            assert_eq!(e.last_error, first_error);
        }
        for e in events.iter().filter(|e| e.entity_type == "weighing") {
            assert!(e.synced);
        }
    }

    /// Outbox whose outcome write-back always fails
    struct ReadOnlyStore {
        inner: MemoryOutboxStore,
    }

    #[async_trait::async_trait]
    impl OutboxStore for ReadOnlyStore {
        async fn add(&self, event: SyncEvent) -> Result<(), StoreError> {
            self.inner.add(event).await
        }

        async fn get(&self, id: &str) -> Result<Option<SyncEvent>, StoreError> {
            self.inner.get(id).await
        }

        async fn all(&self) -> Result<Vec<SyncEvent>, StoreError> {
            self.inner.all().await
        }

        async fn bulk_update(
            &self,
            _updates: Vec<(String, EventChanges)>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Database(
                "connection reset".to_string(),
            ))
        }

        async fn bulk_delete(&self, ids: Vec<String>) -> Result<u64, StoreError> {
            self.inner.bulk_delete(ids).await
        }
    }

    #[tokio::test]
    async fn test_write_back_failure_turns_successes_into_failures() {
        let inner = MemoryOutboxStore::new();
        for i in 0..3 {
            let payload = json!({"uuid": format!("w-{}", i), "weight": 310}).to_string();
            inner
                .add(event(EntityType::Weighing, Operation::Insert, &payload))
                .await
                .unwrap();
        }
        let remote = MemoryRemoteStore::new();
        let executor = BatchExecutor::new(
            Arc::new(ReadOnlyStore {
                inner: inner.clone(),
            }),
            Arc::new(remote.clone()),
        );

        let batch = batches(&inner).await.remove(0);
        let result = executor.execute(&batch, Utc::now()).await;

        // the remote call itself went through
        assert_eq!(remote.rows("weighings").len(), 3);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failure_count, 3);
        assert!(result
            .errors
            .last()
            .unwrap()
            .contains("failed to record sync outcome"));

        // nothing was recorded, so the events are retried next run
        let stored = inner.all().await.unwrap();
        assert!(stored.iter().all(|e| !e.synced && e.attempt_count == 0));
    }

    #[test]
    fn test_parse_row() {
        assert!(parse_row("").is_none());
        assert!(parse_row("   ").is_none());
        assert!(parse_row("{}").is_none());
        assert!(parse_row("null").is_none());
        assert!(parse_row("{broken").is_none());
        assert!(parse_row(r#"{"uuid":"a"}"#).is_some());
    }
}
