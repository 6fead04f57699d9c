pub mod entity_type;
pub mod sync;
pub mod sync_event;
