//! Event recorder
//!
//! Every local write path calls `record` once per logical mutation, right
//! after the mutation commits. Recording touches only the outbox; the remote
//! is reached later by the drain.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::models::entity_type::EntityType;
use crate::models::sync_event::{Operation, SyncEvent};
use crate::services::outbox_store::{OutboxStore, StoreError};

#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn OutboxStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Append one event and return its id
    pub async fn record(
        &self,
        operation: Operation,
        entity_type: EntityType,
        target_id: &str,
        payload: Option<&Value>,
    ) -> Result<String, StoreError> {
        self.append(operation, entity_type, target_id, payload, None)
            .await
    }

    /// Append a DELETE for a record the remote store may already hold
    ///
    /// `remote_id` is `None` when the record never reached the remote; such a
    /// delete is settled locally on the next drain without a remote call.
    pub async fn record_delete(
        &self,
        entity_type: EntityType,
        target_id: &str,
        remote_id: Option<&str>,
    ) -> Result<String, StoreError> {
        self.append(
            Operation::Delete,
            entity_type,
            target_id,
            None,
            remote_id.map(str::to_string),
        )
        .await
    }

    async fn append(
        &self,
        operation: Operation,
        entity_type: EntityType,
        target_id: &str,
        payload: Option<&Value>,
        remote_id: Option<String>,
    ) -> Result<String, StoreError> {
        let payload = match payload {
            Some(value) => serde_json::to_string(value)?,
            None => String::new(),
        };

        let event = SyncEvent::new(
            operation,
            entity_type,
            target_id,
            payload,
            remote_id,
            Utc::now(),
        );
        let id = event.id.clone();

        self.store.add(event).await?;

        debug!(
            event_id = %id,
            operation = %operation,
            entity_type = %entity_type,
            target_id = target_id,
            "Recorded sync event"
        );
        Ok(id)
    }
}
