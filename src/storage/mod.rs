pub mod log_store;
pub mod maintenance;
pub mod snapshot;

pub use log_store::{AppendOutcome, LogStore};
pub use maintenance::{spawn_cleanup_task, spawn_flush_task, SnapshotFlusher};
pub use snapshot::SnapshotFile;
