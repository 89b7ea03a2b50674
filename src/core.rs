//! Process-wide state shared by every request handler.
//!
//! `CoreState` is built once at startup and handed out behind an `Arc`; it owns
//! the log store, the device table, the live fan-out and the capture manager.

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::analyzers::DeviceStatsTable;
use crate::collectors::{
    CaptureManager, EntryPipeline, PacketSourceFactory, RestartPolicy, StopOutcome,
};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::events::{EventFanout, LiveEvent};
use crate::models::MemoryStats;
use crate::storage::{spawn_cleanup_task, spawn_flush_task, LogStore, SnapshotFile, SnapshotFlusher};

pub struct CoreState {
    config: MonitorConfig,
    store: Arc<LogStore>,
    devices: Arc<DeviceStatsTable>,
    fanout: Arc<EventFanout>,
    pipeline: Arc<EntryPipeline>,
    capture: CaptureManager,
    flusher: Option<Arc<SnapshotFlusher>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoreState {
    /// Builds the shared state, rehydrating the store from the configured snapshot.
    ///
    /// A missing or unreadable snapshot yields an empty store.
    pub fn new(config: MonitorConfig, factory: Arc<dyn PacketSourceFactory>) -> Result<Self> {
        config.validate()?;

        let snapshot = config.snapshot_path.as_ref().map(SnapshotFile::new);
        let restored = snapshot.as_ref().map(SnapshotFile::load).unwrap_or_default();
        let store = Arc::new(LogStore::with_entries(config.max_logs, restored));
        if !store.is_empty() {
            info!("Restored {} log entries from snapshot", store.len());
        }

        let devices = Arc::new(DeviceStatsTable::from_entries(&store.snapshot()));
        let fanout = Arc::new(EventFanout::new(config.event_buffer, config.stats_every));
        let pipeline = Arc::new(EntryPipeline::new(
            Arc::clone(&store),
            Arc::clone(&devices),
            Arc::clone(&fanout),
            config.memory_warning_threshold,
        ));

        let capture = CaptureManager::new(
            factory,
            Arc::clone(&pipeline),
            config.stop_timeout(),
            RestartPolicy {
                max_attempts: config.max_restart_attempts,
                initial_delay: config.restart_delay(),
            },
        );

        let flusher = snapshot.map(|file| Arc::new(SnapshotFlusher::new(Arc::clone(&store), file)));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            devices,
            fanout,
            pipeline,
            capture,
            flusher,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the periodic prune task and, when persistence is on, the flush task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_maintenance(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        tasks.push(spawn_cleanup_task(
            Arc::clone(&self.store),
            self.config.cleanup_interval(),
            self.config.max_log_age(),
            self.shutdown_tx.subscribe(),
        ));

        if let Some(flusher) = &self.flusher {
            tasks.push(spawn_flush_task(
                Arc::clone(flusher),
                self.config.flush_interval(),
                self.shutdown_tx.subscribe(),
            ));
        }

        debug!("Started {} maintenance task(s)", tasks.len());
    }

    /// Stops the active capture, winds down maintenance and performs the final flush.
    pub async fn shutdown(&self) -> StopOutcome {
        info!("Shutting down DNS watcher...");
        let outcome = self.capture.stop().await;

        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Maintenance task ended abnormally: {e}");
            }
        }

        if let Some(flusher) = self.flusher.clone() {
            match tokio::task::spawn_blocking(move || flusher.flush_if_changed()).await {
                Ok(Ok(true)) => info!("Final snapshot written"),
                Ok(Ok(false)) => debug!("Snapshot already up to date"),
                Ok(Err(e)) => warn!("Final flush failed: {e}"),
                Err(e) => warn!("Final flush task panicked: {e}"),
            }
        }

        outcome
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    pub fn devices(&self) -> &Arc<DeviceStatsTable> {
        &self.devices
    }

    pub fn capture(&self) -> &CaptureManager {
        &self.capture
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.fanout.subscribe()
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.pipeline.memory_stats()
    }

    /// Pushes a memory snapshot to live observers outside the regular cadence.
    pub fn publish_memory_stats(&self) -> MemoryStats {
        let stats = self.memory_stats();
        self.fanout.publish_memory_stats(stats);
        stats
    }

    /// Writes the snapshot now if the store changed; `Ok(false)` when persistence is off.
    pub fn flush_snapshot(&self) -> Result<bool> {
        match &self.flusher {
            Some(flusher) => flusher.flush_if_changed(),
            None => Ok(false),
        }
    }
}
