//! Migration to create the sync_status table
//!
//! Background jobs record their last run here so a restart does not redo a
//! retention sweep that ran an hour ago.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncStatus::Table)
                    .if_not_exists()
                    .col(pk_auto(SyncStatus::Id))
                    .col(string_len(SyncStatus::JobName, 100).not_null().unique_key())
                    .col(timestamp_null(SyncStatus::LastSuccessAt))
                    .col(timestamp_null(SyncStatus::LastAttemptAt))
                    .col(text_null(SyncStatus::LastError))
                    .col(big_integer(SyncStatus::SuccessCount).not_null().default(0))
                    .col(big_integer(SyncStatus::ErrorCount).not_null().default(0))
                    .col(big_integer(SyncStatus::LastProcessed).not_null().default(0))
                    .col(big_integer(SyncStatus::LastFailed).not_null().default(0))
                    // Default 1 hour minimum between runs
                    .col(integer(SyncStatus::MinIntervalSecs).not_null().default(3600))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncStatus::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncStatus {
    Table,
    Id,
    JobName,
    LastSuccessAt,
    LastAttemptAt,
    LastError,
    SuccessCount,
    ErrorCount,
    LastProcessed,
    LastFailed,
    MinIntervalSecs,
}
