//! Outbox store
//!
//! Durable table of pending change events. The sync core only needs keyed
//! reads, a full scan and bulk keyed updates/deletes, so the store is a trait
//! with a sea-orm implementation (`DbOutboxStore`) and a process-local one.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::sync_event::{EventChanges, SyncEvent};

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Stored row that cannot be turned into a [`SyncEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadableEvent {
    pub id: String,
    /// Raw operation column
    pub operation: String,
    pub entity_type: String,
    pub created_at: String,
    pub reason: String,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn add(&self, event: SyncEvent) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<SyncEvent>, StoreError>;

    /// Every stored event, in insertion order
    async fn all(&self) -> Result<Vec<SyncEvent>, StoreError>;

    /// Apply per-event changes; unknown ids are skipped
    async fn bulk_update(&self, updates: Vec<(String, EventChanges)>) -> Result<(), StoreError>;

    /// Returns how many events were removed
    async fn bulk_delete(&self, ids: Vec<String>) -> Result<u64, StoreError>;

    /// Rows left out of [`OutboxStore::all`] because they could not be read
    async fn unreadable(&self) -> Result<Vec<UnreadableEvent>, StoreError> {
        Ok(Vec::new())
    }
}

/// Process-local outbox, used by tests and embedded callers
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    events: Arc<RwLock<Vec<SyncEvent>>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn add(&self, event: SyncEvent) -> Result<(), StoreError> {
        let mut events = self.events.write();
        if events.iter().any(|e| e.id == event.id) {
            return Err(StoreError::Database(format!(
                "duplicate sync event id {}",
                event.id
            )));
        }
        events.push(event);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncEvent>, StoreError> {
        Ok(self.events.read().iter().find(|e| e.id == id).cloned())
    }

    async fn all(&self) -> Result<Vec<SyncEvent>, StoreError> {
        Ok(self.events.read().clone())
    }

    async fn bulk_update(&self, updates: Vec<(String, EventChanges)>) -> Result<(), StoreError> {
        let mut events = self.events.write();
        for (id, changes) in &updates {
            if let Some(event) = events.iter_mut().find(|e| &e.id == id) {
                event.apply(changes);
            }
        }
        Ok(())
    }

    async fn bulk_delete(&self, ids: Vec<String>) -> Result<u64, StoreError> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| !ids.contains(&e.id));
        Ok((before - events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity_type::EntityType;
    use crate::models::sync_event::Operation;
    use chrono::Utc;

    fn event(target: &str) -> SyncEvent {
        SyncEvent::new(
            Operation::Insert,
            EntityType::Breed,
            target,
            r#"{"uuid":"b"}"#.to_string(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = MemoryOutboxStore::new();
        let e = event("b-1");
        store.add(e.clone()).await.unwrap();
        assert_eq!(store.get(&e.id).await.unwrap(), Some(e));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryOutboxStore::new();
        let e = event("b-1");
        store.add(e.clone()).await.unwrap();
        assert!(store.add(e).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_all_keeps_insertion_order() {
        let store = MemoryOutboxStore::new();
        let first = event("b-1");
        let second = event("b-2");
        store.add(first.clone()).await.unwrap();
        store.add(second.clone()).await.unwrap();
        let ids: Vec<String> = store.all().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_bulk_update_and_delete() {
        let store = MemoryOutboxStore::new();
        let a = event("b-1");
        let b = event("b-2");
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();

        let changes = EventChanges {
            synced: Some(true),
            ..Default::default()
        };
        store
            .bulk_update(vec![(a.id.clone(), changes), ("missing".to_string(), EventChanges::default())])
            .await
            .unwrap();
        assert!(store.get(&a.id).await.unwrap().unwrap().synced);
        assert!(!store.get(&b.id).await.unwrap().unwrap().synced);

        let removed = store.bulk_delete(vec![a.id.clone(), "missing".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
