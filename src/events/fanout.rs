//! Live push of accepted entries and memory snapshots to observers.
//!
//! Backed by a `tokio::sync::broadcast` channel: publishing never blocks the
//! capture thread, and an observer that falls more than `capacity` events behind
//! loses the oldest ones (`RecvError::Lagged`) instead of stalling ingestion.

use log::trace;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::models::{LogEntry, MemoryStats};

/// Event delivered to live observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    NewLog(LogEntry),
    MemoryStats(MemoryStats),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::NewLog(_) => "new_log",
            LiveEvent::MemoryStats(_) => "memory_stats",
        }
    }
}

#[derive(Debug)]
pub struct EventFanout {
    sender: broadcast::Sender<LiveEvent>,
    accepted: AtomicU64,
    stats_every: u64,
}

impl EventFanout {
    pub fn new(capacity: usize, stats_every: u64) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            accepted: AtomicU64::new(0),
            stats_every: stats_every.max(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes a `new_log` event.
    ///
    /// Returns `true` when this entry completes another `stats_every` batch and a
    /// memory snapshot is due.
    pub fn publish_entry(&self, entry: LogEntry) -> bool {
        let accepted = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        self.send(LiveEvent::NewLog(entry));
        accepted % self.stats_every == 0
    }

    pub fn publish_memory_stats(&self, stats: MemoryStats) {
        self.send(LiveEvent::MemoryStats(stats));
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    fn send(&self, event: LiveEvent) {
        if self.sender.send(event).is_err() {
            trace!("No live observers connected");
        }
    }
}
