//! Migration to create the sync_events outbox table
//!
//! Every local write appends one row here; the outbox drain marks rows synced
//! and the retention sweep removes old synced rows.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncEvents::Table)
                    .if_not_exists()
                    .col(big_integer(SyncEvents::Seq).auto_increment().primary_key())
                    .col(string_len(SyncEvents::EventId, 36).not_null().unique_key())
                    .col(string_len(SyncEvents::Operation, 16).not_null())
                    .col(string_len(SyncEvents::EntityType, 64).not_null())
                    .col(string(SyncEvents::TargetId).not_null())
                    .col(text(SyncEvents::Payload).not_null().default(""))
                    .col(integer(SyncEvents::AttemptCount).not_null().default(0))
                    .col(text_null(SyncEvents::LastError))
                    .col(boolean(SyncEvents::Synced).not_null().default(false))
                    .col(string_len(SyncEvents::CreatedAt, 40).not_null())
                    .col(string_len(SyncEvents::UpdatedAt, 40).not_null())
                    .col(string_null(SyncEvents::RemoteId))
                    .to_owned(),
            )
            .await?;

        // Planner scans unsynced rows in creation order
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_events_synced_created_at")
                    .table(SyncEvents::Table)
                    .col(SyncEvents::Synced)
                    .col(SyncEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_events_entity_type")
                    .table(SyncEvents::Table)
                    .col(SyncEvents::EntityType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncEvents {
    Table,
    Seq,
    EventId,
    Operation,
    EntityType,
    TargetId,
    Payload,
    AttemptCount,
    LastError,
    Synced,
    CreatedAt,
    UpdatedAt,
    RemoteId,
}
