//! Postgres-backed outbox store (sea-orm, `sync_events` table)

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use tracing::{debug, warn};

use crate::entities::sync_events::{self, Entity as SyncEvents};
use crate::models::sync_event::{EventChanges, SyncEvent};
use crate::services::outbox_store::{OutboxStore, StoreError, UnreadableEvent};

#[derive(Clone)]
pub struct DbOutboxStore {
    db: DatabaseConnection,
}

impl DbOutboxStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_event(row: sync_events::Model) -> Result<SyncEvent, StoreError> {
    let operation = row
        .operation
        .parse()
        .map_err(|e: String| StoreError::Serialization(format!("event {}: {}", row.event_id, e)))?;

    Ok(SyncEvent {
        id: row.event_id,
        operation,
        entity_type: row.entity_type,
        target_id: row.target_id,
        payload: row.payload,
        attempt_count: row.attempt_count,
        last_error: row.last_error,
        synced: row.synced,
        created_at: row.created_at,
        updated_at: row.updated_at,
        remote_id: row.remote_id,
    })
}

/// Split rows into readable events and rows that need manual repair
fn split_rows(rows: Vec<sync_events::Model>) -> (Vec<SyncEvent>, Vec<UnreadableEvent>) {
    let mut events = Vec::with_capacity(rows.len());
    let mut unreadable = Vec::new();

    for row in rows {
        let raw = UnreadableEvent {
            id: row.event_id.clone(),
            operation: row.operation.clone(),
            entity_type: row.entity_type.clone(),
            created_at: row.created_at.clone(),
            reason: String::new(),
        };
        match to_event(row) {
            Ok(event) => events.push(event),
            Err(e) => unreadable.push(UnreadableEvent {
                reason: e.to_string(),
                ..raw
            }),
        }
    }

    (events, unreadable)
}

impl DbOutboxStore {
    async fn scan(&self) -> Result<(Vec<SyncEvent>, Vec<UnreadableEvent>), StoreError> {
        let rows = SyncEvents::find()
            .order_by(sync_events::Column::Seq, Order::Asc)
            .all(&self.db)
            .await?;
        Ok(split_rows(rows))
    }
}

#[async_trait]
impl OutboxStore for DbOutboxStore {
    async fn add(&self, event: SyncEvent) -> Result<(), StoreError> {
        let row = sync_events::ActiveModel {
            event_id: Set(event.id),
            operation: Set(event.operation.as_str().to_string()),
            entity_type: Set(event.entity_type),
            target_id: Set(event.target_id),
            payload: Set(event.payload),
            attempt_count: Set(event.attempt_count),
            last_error: Set(event.last_error),
            synced: Set(event.synced),
            created_at: Set(event.created_at),
            updated_at: Set(event.updated_at),
            remote_id: Set(event.remote_id),
            ..Default::default()
        };
        row.insert(&self.db).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SyncEvent>, StoreError> {
        SyncEvents::find()
            .filter(sync_events::Column::EventId.eq(id))
            .one(&self.db)
            .await?
            .map(to_event)
            .transpose()
    }

    async fn all(&self) -> Result<Vec<SyncEvent>, StoreError> {
        // Unreadable rows stay in place for manual repair and show up in
        // diagnostics through `unreadable()`
        let (events, unreadable) = self.scan().await?;
        if !unreadable.is_empty() {
            warn!(count = unreadable.len(), "Skipping unreadable sync events");
        }
        Ok(events)
    }

    async fn bulk_update(&self, updates: Vec<(String, EventChanges)>) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;
        let mut touched = 0u64;

        for (id, changes) in updates {
            if changes.is_empty() {
                continue;
            }

            let mut query = SyncEvents::update_many();
            if let Some(attempt_count) = changes.attempt_count {
                query = query.col_expr(sync_events::Column::AttemptCount, Expr::value(attempt_count));
            }
            if let Some(last_error) = changes.last_error {
                query = query.col_expr(sync_events::Column::LastError, Expr::value(last_error));
            }
            if let Some(synced) = changes.synced {
                query = query.col_expr(sync_events::Column::Synced, Expr::value(synced));
            }
            if let Some(updated_at) = changes.updated_at {
                query = query.col_expr(sync_events::Column::UpdatedAt, Expr::value(updated_at));
            }

            let result = query
                .filter(sync_events::Column::EventId.eq(id))
                .exec(&txn)
                .await?;
            touched += result.rows_affected;
        }

        txn.commit().await?;
        debug!(rows = touched, "Applied sync event updates");
        Ok(())
    }

    async fn bulk_delete(&self, ids: Vec<String>) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = SyncEvents::delete_many()
            .filter(sync_events::Column::EventId.is_in(ids))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn unreadable(&self) -> Result<Vec<UnreadableEvent>, StoreError> {
        let (_, unreadable) = self.scan().await?;
        Ok(unreadable)
    }
}
