//! Sync API request/response models
//!
//! Models for the /api/sync endpoints: recording outbox events from write
//! paths and inspecting or driving the queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::entity_type::EntityType;
use crate::models::sync_event::{Operation, SyncEvent};
use crate::services::queue_inspector::EventFilter;

/// Default number of events returned by the listing
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Upper bound for the listing
pub const MAX_LIST_LIMIT: usize = 500;

/// Body of POST /api/sync/events
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    /// INSERT, UPDATE or DELETE
    pub operation: String,
    /// Entity tag, e.g. "weighing"
    pub entity_type: String,
    pub target_id: String,
    /// Row snapshot for INSERT/UPDATE
    pub payload: Option<Value>,
    /// Remote row id, DELETE only
    pub remote_id: Option<String>,
}

/// Validated form of [`RecordEventRequest`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub operation: Operation,
    pub entity_type: EntityType,
}

impl RecordEventRequest {
    pub fn validate(&self) -> Result<ValidatedRecord, String> {
        let operation: Operation = self.operation.parse()?;
        let entity_type: EntityType = self.entity_type.parse()?;

        if self.target_id.trim().is_empty() {
            return Err("targetId must not be empty".to_string());
        }
        if self.remote_id.is_some() && !operation.is_delete() {
            return Err("remoteId is only accepted for DELETE".to_string());
        }

        Ok(ValidatedRecord {
            operation,
            entity_type,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEventResponse {
    pub id: String,
}

/// Query of GET /api/sync/events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListEventsQuery {
    /// pending (default), failed, synced or all
    pub status: Option<String>,
    /// Maximum number of results (default: 100, max: 500)
    pub limit: Option<i64>,
}

impl ListEventsQuery {
    pub fn validate(&self) -> Result<(EventFilter, usize), String> {
        let filter = match &self.status {
            Some(status) => status.parse()?,
            None => EventFilter::default(),
        };

        let limit = match self.limit {
            None => DEFAULT_LIST_LIMIT,
            Some(limit) if limit < 1 => return Err("limit must be at least 1".to_string()),
            Some(limit) if limit as usize > MAX_LIST_LIMIT => {
                return Err(format!("limit cannot exceed {}", MAX_LIST_LIMIT));
            }
            Some(limit) => limit as usize,
        };

        Ok((filter, limit))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub events: Vec<SyncEvent>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(operation: &str, entity: &str, remote_id: Option<&str>) -> RecordEventRequest {
        RecordEventRequest {
            operation: operation.to_string(),
            entity_type: entity.to_string(),
            target_id: "t-1".to_string(),
            payload: Some(json!({"uuid": "t-1"})),
            remote_id: remote_id.map(str::to_string),
        }
    }

    #[test]
    fn test_record_validation_valid() {
        let valid = request("insert", "weighing", None).validate().unwrap();
        assert_eq!(valid.operation, Operation::Insert);
        assert_eq!(valid.entity_type, EntityType::Weighing);
        assert!(request("DELETE", "farm", Some("12")).validate().is_ok());
    }

    #[test]
    fn test_record_validation_rejects_unknown_values() {
        assert!(request("MERGE", "weighing", None).validate().is_err());
        assert!(request("INSERT", "pasture", None).validate().is_err());
    }

    #[test]
    fn test_record_validation_remote_id_only_on_delete() {
        let err = request("UPDATE", "farm", Some("12")).validate().unwrap_err();
        assert!(err.contains("remoteId"));
    }

    #[test]
    fn test_record_validation_empty_target() {
        let mut req = request("INSERT", "farm", None);
        req.target_id = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_list_query_defaults() {
        let (filter, limit) = ListEventsQuery::default().validate().unwrap();
        assert_eq!(filter, EventFilter::Pending);
        assert_eq!(limit, DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn test_list_query_limits() {
        let too_high = ListEventsQuery {
            status: None,
            limit: Some(501),
        };
        assert!(too_high.validate().is_err());
        let too_low = ListEventsQuery {
            status: None,
            limit: Some(0),
        };
        assert!(too_low.validate().is_err());
        let bad_status = ListEventsQuery {
            status: Some("stuck".to_string()),
            limit: None,
        };
        assert!(bad_status.validate().is_err());
    }
}
