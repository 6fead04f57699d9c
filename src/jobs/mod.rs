pub mod outbox_sync;
pub mod outbox_retention;
