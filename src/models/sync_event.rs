//! Outbox event model
//!
//! A `SyncEvent` is one attempted local mutation waiting to reach the remote
//! store. Timestamps are kept as RFC 3339 strings (millisecond precision, `Z`
//! suffix) so they sort lexically in the same order as chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::entity_type::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub id: String,
    pub operation: Operation,
    /// Stored tag; see [`SyncEvent::entity`] for the typed form
    pub entity_type: String,
    pub target_id: String,
    /// JSON snapshot for INSERT/UPDATE, empty for DELETE
    pub payload: String,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub synced: bool,
    pub created_at: String,
    pub updated_at: String,
    pub remote_id: Option<String>,
}

impl SyncEvent {
    /// Fresh, never-attempted event
    pub fn new(
        operation: Operation,
        entity_type: EntityType,
        target_id: impl Into<String>,
        payload: String,
        remote_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let timestamp = format_timestamp(now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            entity_type: entity_type.as_str().to_string(),
            target_id: target_id.into(),
            payload,
            attempt_count: 0,
            last_error: None,
            synced: false,
            created_at: timestamp.clone(),
            updated_at: timestamp,
            remote_id,
        }
    }

    /// Typed entity, `None` when the stored tag is not a known entity type
    pub fn entity(&self) -> Option<EntityType> {
        self.entity_type.parse().ok()
    }

    pub fn is_exhausted(&self, max_attempts: i32) -> bool {
        self.attempt_count >= max_attempts
    }

    pub fn apply(&mut self, changes: &EventChanges) {
        if let Some(attempt_count) = changes.attempt_count {
            self.attempt_count = attempt_count;
        }
        if let Some(last_error) = &changes.last_error {
            self.last_error = last_error.clone();
        }
        if let Some(synced) = changes.synced {
            self.synced = synced;
        }
        if let Some(updated_at) = &changes.updated_at {
            self.updated_at = updated_at.clone();
        }
    }
}

/// Partial update applied through `OutboxStore::bulk_update`
///
/// `None` leaves a field untouched; `last_error: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventChanges {
    pub attempt_count: Option<i32>,
    pub last_error: Option<Option<String>>,
    pub synced: Option<bool>,
    pub updated_at: Option<String>,
}

impl EventChanges {
    /// Outcome of one processing attempt on `event`
    pub fn attempted(event: &SyncEvent, now: DateTime<Utc>, outcome: Result<(), String>) -> Self {
        let (synced, last_error) = match outcome {
            Ok(()) => (true, None),
            Err(message) => (false, Some(message)),
        };
        Self {
            attempt_count: Some(event.attempt_count + 1),
            last_error: Some(last_error),
            synced: Some(synced),
            updated_at: Some(format_timestamp(now)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempt_count.is_none()
            && self.last_error.is_none()
            && self.synced.is_none()
            && self.updated_at.is_none()
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SyncEvent {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        SyncEvent::new(
            Operation::Update,
            EntityType::Weighing,
            "w-1",
            r#"{"uuid":"w-1","weight":412.5}"#.to_string(),
            None,
            now,
        )
    }

    #[test]
    fn test_new_event_defaults() {
        let event = sample();
        assert_eq!(event.attempt_count, 0);
        assert!(!event.synced);
        assert!(event.last_error.is_none());
        assert_eq!(event.created_at, "2026-03-01T12:00:00.000Z");
        assert_eq!(event.created_at, event.updated_at);
        assert_eq!(event.entity(), Some(EntityType::Weighing));
    }

    #[test]
    fn test_attempt_failure_keeps_pending() {
        let event = sample();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 12, 5, 0).unwrap();
        let changes = EventChanges::attempted(&event, later, Err("timeout".to_string()));

        let mut updated = event.clone();
        updated.apply(&changes);
        assert_eq!(updated.attempt_count, 1);
        assert!(!updated.synced);
        assert_eq!(updated.last_error.as_deref(), Some("timeout"));
        assert_eq!(updated.updated_at, "2026-03-01T12:05:00.000Z");
        assert_eq!(updated.created_at, event.created_at);
    }

    #[test]
    fn test_attempt_success_clears_error() {
        let mut event = sample();
        event.last_error = Some("earlier failure".to_string());
        event.attempt_count = 2;
        let changes = EventChanges::attempted(&event, Utc::now(), Ok(()));
        event.apply(&changes);
        assert_eq!(event.attempt_count, 3);
        assert!(event.synced);
        assert!(event.last_error.is_none());
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert_eq!("INSERT".parse::<Operation>().unwrap(), Operation::Insert);
        assert!("UPSERT".parse::<Operation>().is_err());
    }

    #[test]
    fn test_timestamp_parse() {
        assert!(parse_timestamp("2026-03-01T12:00:00.000Z").is_some());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
