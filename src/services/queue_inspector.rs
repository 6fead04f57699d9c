//! Read-only views over the outbox: counts, diagnostics and listings.
//! Nothing here mutates the store or reaches the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::entity_type::EntityType;
use crate::models::sync_event::{parse_timestamp, Operation, SyncEvent};
use crate::services::outbox_store::{OutboxStore, StoreError, UnreadableEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub total: usize,
    /// Unsynced and still under the attempt ceiling
    pub pending: usize,
    pub synced: usize,
    /// Unsynced and at or past the attempt ceiling
    pub failed: usize,
}

impl QueueCounts {
    fn count(&mut self, event: &SyncEvent, max_attempts: i32) {
        self.total += 1;
        if event.synced {
            self.synced += 1;
        } else if event.is_exhausted(max_attempts) {
            self.failed += 1;
        } else {
            self.pending += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    #[serde(flatten)]
    pub counts: QueueCounts,
    /// Pending events whose last attempt failed
    pub retrying: usize,
    pub by_operation: BTreeMap<String, QueueCounts>,
    pub by_entity_type: BTreeMap<String, QueueCounts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub id: String,
    pub entity_type: String,
    pub operation: Operation,
    pub created_at: String,
}

impl From<&SyncEvent> for EventRef {
    fn from(event: &SyncEvent) -> Self {
        Self {
            id: event.id.clone(),
            entity_type: event.entity_type.clone(),
            operation: event.operation,
            created_at: event.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDiagnostics {
    /// Events whose `created_at` is not RFC 3339; planning order is
    /// unreliable for them
    pub invalid_created_at: Vec<EventRef>,
    /// Events whose stored tag has no remote table mapping
    pub unknown_entity_types: Vec<EventRef>,
    /// Stored rows that could not be read at all (e.g. a bad operation);
    /// they are missing from stats, listings and sync runs
    pub unreadable: Vec<UnreadableEvent>,
    pub oldest_pending_created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFilter {
    #[default]
    Pending,
    Failed,
    Synced,
    All,
}

impl std::str::FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EventFilter::Pending),
            "failed" => Ok(EventFilter::Failed),
            "synced" => Ok(EventFilter::Synced),
            "all" => Ok(EventFilter::All),
            other => Err(format!("unknown event filter '{}'", other)),
        }
    }
}

impl EventFilter {
    fn matches(&self, event: &SyncEvent, max_attempts: i32) -> bool {
        match self {
            EventFilter::Pending => !event.synced && !event.is_exhausted(max_attempts),
            EventFilter::Failed => !event.synced && event.is_exhausted(max_attempts),
            EventFilter::Synced => event.synced,
            EventFilter::All => true,
        }
    }
}

#[derive(Clone)]
pub struct QueueInspector {
    store: Arc<dyn OutboxStore>,
    max_attempts: i32,
}

impl QueueInspector {
    pub fn new(store: Arc<dyn OutboxStore>, max_attempts: i32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    pub async fn stats(&self) -> Result<QueueStats, StoreError> {
        let events = self.store.all().await?;
        Ok(compute_stats(&events, self.max_attempts))
    }

    pub async fn diagnostics(&self) -> Result<QueueDiagnostics, StoreError> {
        let events = self.store.all().await?;
        let mut diagnostics = compute_diagnostics(&events);
        diagnostics.unreadable = self.store.unreadable().await?;
        Ok(diagnostics)
    }

    /// Events matching `filter`, oldest first, at most `limit`
    pub async fn list_events(
        &self,
        filter: EventFilter,
        limit: usize,
    ) -> Result<Vec<SyncEvent>, StoreError> {
        let mut events: Vec<SyncEvent> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e, self.max_attempts))
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        events.truncate(limit);
        Ok(events)
    }
}

pub fn compute_stats(events: &[SyncEvent], max_attempts: i32) -> QueueStats {
    let mut stats = QueueStats::default();

    // Every operation and known entity type shows up, even at zero
    for operation in Operation::ALL {
        stats
            .by_operation
            .insert(operation.as_str().to_string(), QueueCounts::default());
    }
    for entity in EntityType::ALL {
        stats
            .by_entity_type
            .insert(entity.as_str().to_string(), QueueCounts::default());
    }

    for event in events {
        stats.counts.count(event, max_attempts);
        if !event.synced && !event.is_exhausted(max_attempts) && event.last_error.is_some() {
            stats.retrying += 1;
        }
        stats
            .by_operation
            .entry(event.operation.as_str().to_string())
            .or_default()
            .count(event, max_attempts);
        stats
            .by_entity_type
            .entry(event.entity_type.clone())
            .or_default()
            .count(event, max_attempts);
    }

    stats
}

pub fn compute_diagnostics(events: &[SyncEvent]) -> QueueDiagnostics {
    let mut diagnostics = QueueDiagnostics::default();

    for event in events {
        if parse_timestamp(&event.created_at).is_none() {
            diagnostics.invalid_created_at.push(EventRef::from(event));
        }
        if event.entity().is_none() {
            diagnostics.unknown_entity_types.push(EventRef::from(event));
        }
    }

    diagnostics.oldest_pending_created_at = events
        .iter()
        .filter(|e| !e.synced && parse_timestamp(&e.created_at).is_some())
        .map(|e| e.created_at.clone())
        .min();

    diagnostics
}
