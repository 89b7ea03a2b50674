use chrono::Local;
use log::{debug, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};

use crate::error::Result;
use crate::storage::{LogStore, SnapshotFile};

/// Spawns the periodic age-based prune pass.
///
/// Runs every `period` independent of append volume and exits when `shutdown`
/// flips to `true` or its sender is dropped.
pub fn spawn_cleanup_task(
    store: Arc<LogStore>,
    period: Duration,
    max_age: chrono::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if store.is_empty() {
                        continue;
                    }
                    store.prune(Local::now().naive_local(), max_age);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Cleanup task stopping");
                        return;
                    }
                }
            }
        }
    })
}

/// Writes the store to its snapshot when it changed since the last flush.
///
/// Flushes are serialized; concurrent callers never share the temp file.
#[derive(Debug)]
pub struct SnapshotFlusher {
    store: Arc<LogStore>,
    snapshot: SnapshotFile,
    flushed_revision: AtomicU64,
    write_lock: Mutex<()>,
}

impl SnapshotFlusher {
    pub fn new(store: Arc<LogStore>, snapshot: SnapshotFile) -> Self {
        let flushed_revision = AtomicU64::new(store.revision());
        Self {
            store,
            snapshot,
            flushed_revision,
            write_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> &SnapshotFile {
        &self.snapshot
    }

    /// Returns `true` when a write happened.
    pub fn flush_if_changed(&self) -> Result<bool> {
        let _writing = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (entries, revision) = self.store.snapshot_with_revision();
        if revision == self.flushed_revision.load(Ordering::Acquire) {
            return Ok(false);
        }

        self.snapshot.save(&entries)?;
        self.flushed_revision.store(revision, Ordering::Release);
        debug!(
            "Flushed {} entries to {}",
            entries.len(),
            self.snapshot.path().display()
        );
        Ok(true)
    }
}

pub fn spawn_flush_task(
    flusher: Arc<SnapshotFlusher>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let flusher = Arc::clone(&flusher);
                    match tokio::task::spawn_blocking(move || flusher.flush_if_changed()).await {
                        Ok(Err(e)) => warn!("Background flush failed: {e}"),
                        Err(e) => warn!("Background flush task panicked: {e}"),
                        Ok(Ok(_)) => {}
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Flush task stopping");
                        return;
                    }
                }
            }
        }
    })
}
