use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::LogEntry;

/// Rolling counters for a single source address.
///
/// Counters only ever grow for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub first_seen: String,
    pub last_seen: String,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub protocol_counts: BTreeMap<String, u64>,
    /// Destination addresses seen for this device, when the capture layer knows them
    pub distinct_destinations: BTreeSet<String>,
}

impl DeviceStats {
    pub fn new(first_seen: impl Into<String>) -> Self {
        let first_seen = first_seen.into();
        Self {
            last_seen: first_seen.clone(),
            first_seen,
            packets_received: 0,
            bytes_received: 0,
            protocol_counts: BTreeMap::new(),
            distinct_destinations: BTreeSet::new(),
        }
    }

    pub fn apply(&mut self, entry: &LogEntry, destination: Option<&str>) {
        self.last_seen = entry.timestamp.clone();
        self.packets_received += 1;
        self.bytes_received += entry.length;
        *self
            .protocol_counts
            .entry(entry.protocol.clone())
            .or_insert(0) += 1;

        if let Some(destination) = destination {
            if !self.distinct_destinations.contains(destination) {
                self.distinct_destinations.insert(destination.to_string());
            }
        }
    }
}
