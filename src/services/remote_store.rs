//! Remote relational store
//!
//! The sync core reaches the remote only through two primitives per table:
//! bulk upsert keyed by a conflict column, and bulk delete by id. Both are
//! expected to be atomic per call and safe to retry.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request never produced a response (DNS, connect, timeout)
    Network(String),
    /// Remote answered with a non-success status
    Rejected { status: u16, body: String },
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Network(msg) => write!(f, "Network error: {}", msg),
            RemoteError::Rejected { status, body } => {
                write!(f, "Remote rejected request ({}): {}", status, body)
            }
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert(&self, table: &str, rows: Vec<Row>, conflict_field: &str)
        -> Result<(), RemoteError>;

    async fn delete_by_ids(&self, table: &str, ids: Vec<String>) -> Result<(), RemoteError>;
}

/// In-process remote that keeps rows per table
///
/// Tables can be switched to reject every call, which is how tests simulate
/// an unreachable or refusing backend.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Default)]
struct MemoryRemoteInner {
    tables: HashMap<String, Vec<Row>>,
    failing: HashSet<String>,
    upsert_calls: usize,
    delete_calls: usize,
    calls: Vec<String>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following call against `table` fails with a 503
    pub fn fail_table(&self, table: &str) {
        self.inner.lock().failing.insert(table.to_string());
    }

    pub fn recover_table(&self, table: &str) {
        self.inner.lock().failing.remove(table);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn upsert_calls(&self) -> usize {
        self.inner.lock().upsert_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.inner.lock().delete_calls
    }

    /// Calls in arrival order, as `upsert:<table>` / `delete:<table>`
    pub fn call_log(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Row>,
        conflict_field: &str,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.upsert_calls += 1;
        inner.calls.push(format!("upsert:{}", table));
        if inner.failing.contains(table) {
            return Err(RemoteError::Rejected {
                status: 503,
                body: format!("table {} unavailable", table),
            });
        }

        // Validate the whole call before touching anything: all rows or none
        if let Some(row) = rows.iter().find(|row| !row.contains_key(conflict_field)) {
            return Err(RemoteError::Rejected {
                status: 400,
                body: format!("row missing conflict column {}: {}", conflict_field, Value::Object(row.clone())),
            });
        }

        let stored = inner.tables.entry(table.to_string()).or_default();
        for row in rows {
            let key = row.get(conflict_field).cloned();
            match stored.iter_mut().find(|existing| existing.get(conflict_field) == key.as_ref()) {
                Some(existing) => {
                    for (column, value) in row {
                        existing.insert(column, value);
                    }
                }
                None => stored.push(row),
            }
        }
        Ok(())
    }

    async fn delete_by_ids(&self, table: &str, ids: Vec<String>) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.delete_calls += 1;
        inner.calls.push(format!("delete:{}", table));
        if inner.failing.contains(table) {
            return Err(RemoteError::Rejected {
                status: 503,
                body: format!("table {} unavailable", table),
            });
        }

        if let Some(stored) = inner.tables.get_mut(table) {
            stored.retain(|row| match row.get("id") {
                Some(Value::String(id)) => !ids.contains(id),
                Some(other) => !ids.contains(&other.to_string()),
                None => true,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_column() {
        let remote = MemoryRemoteStore::new();
        remote
            .upsert("weighings", vec![row(json!({"uuid": "a", "weight": 300}))], "uuid")
            .await
            .unwrap();
        remote
            .upsert("weighings", vec![row(json!({"uuid": "a", "weight": 320}))], "uuid")
            .await
            .unwrap();

        let rows = remote.rows("weighings");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["weight"], json!(320));
        assert_eq!(remote.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_upsert_without_key_is_rejected_whole() {
        let remote = MemoryRemoteStore::new();
        let result = remote
            .upsert(
                "breeds",
                vec![row(json!({"uuid": "a"})), row(json!({"name": "Nelore"}))],
                "uuid",
            )
            .await;
        assert!(matches!(result, Err(RemoteError::Rejected { status: 400, .. })));
        assert!(remote.rows("breeds").is_empty());
    }

    #[tokio::test]
    async fn test_failing_table() {
        let remote = MemoryRemoteStore::new();
        remote.fail_table("farms");
        let err = remote.delete_by_ids("farms", vec!["1".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("503"));

        remote.recover_table("farms");
        assert!(remote.delete_by_ids("farms", vec!["1".to_string()]).await.is_ok());
        assert_eq!(remote.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let remote = MemoryRemoteStore::new();
        remote
            .upsert(
                "users",
                vec![row(json!({"id": "u1"})), row(json!({"id": "u2"}))],
                "id",
            )
            .await
            .unwrap();
        remote.delete_by_ids("users", vec!["u1".to_string()]).await.unwrap();
        let rows = remote.rows("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("u2"));
    }
}
