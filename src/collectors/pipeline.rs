use log::{debug, warn};
use std::sync::Arc;

use crate::analyzers::DeviceStatsTable;
use crate::collectors::extractor::Observation;
use crate::events::EventFanout;
use crate::models::MemoryStats;
use crate::storage::LogStore;

/// Per-entry ingest path shared by every capture session.
///
/// Each step takes its own lock and releases it before the next one starts.
#[derive(Debug)]
pub struct EntryPipeline {
    store: Arc<LogStore>,
    devices: Arc<DeviceStatsTable>,
    fanout: Arc<EventFanout>,
    warning_threshold: usize,
}

impl EntryPipeline {
    pub fn new(
        store: Arc<LogStore>,
        devices: Arc<DeviceStatsTable>,
        fanout: Arc<EventFanout>,
        warning_threshold: usize,
    ) -> Self {
        Self {
            store,
            devices,
            fanout,
            warning_threshold,
        }
    }

    /// Appends to the store, updates device stats, then notifies observers.
    pub fn ingest(&self, observation: Observation) {
        let Observation {
            entry,
            destination_ip,
        } = observation;

        debug!("Captured DNS request: {} from {}", entry.domain, entry.source_ip);

        let outcome = self.store.append(entry.clone());
        if outcome.len == self.warning_threshold && outcome.evicted == 0 {
            warn!(
                "Memory usage high: {}/{} logs",
                outcome.len,
                self.store.max_logs()
            );
        }

        let destination = destination_ip.map(|ip| ip.to_string());
        self.devices.record_observation(&entry, destination.as_deref());

        if self.fanout.publish_entry(entry) {
            self.fanout.publish_memory_stats(self.memory_stats());
        }
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.store.memory_stats(self.warning_threshold)
    }
}
