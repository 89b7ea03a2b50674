// DeviceStatsTable: per-source-address counters derived from accepted entries
// Each entry is applied exactly once; the table has its own lock and never
// acquires the log store's lock while holding it

use log::trace;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{MonitorError, Result};
use crate::models::{DeviceStats, LogEntry};

#[derive(Debug, Default)]
pub struct DeviceStatsTable {
    devices: Mutex<HashMap<String, DeviceStats>>,
}

impl DeviceStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from already recorded entries, e.g. a persisted snapshot.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let table = Self::new();
        for entry in entries {
            table.record(entry);
        }
        table
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DeviceStats>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, entry: &LogEntry) {
        self.record_observation(entry, None);
    }

    /// Applies one accepted entry, creating the device lazily on first sight.
    pub fn record_observation(&self, entry: &LogEntry, destination: Option<&str>) {
        let mut devices = self.lock();
        let stats = devices
            .entry(entry.source_ip.clone())
            .or_insert_with(|| DeviceStats::new(entry.timestamp.clone()));
        stats.apply(entry, destination);
        trace!(
            "Device {} now at {} packets",
            entry.source_ip, stats.packets_received
        );
    }

    /// Full-table copy, ordered by address.
    pub fn snapshot(&self) -> BTreeMap<String, DeviceStats> {
        self.lock()
            .iter()
            .map(|(ip, stats)| (ip.clone(), stats.clone()))
            .collect()
    }

    pub fn get(&self, source_ip: &str) -> Result<DeviceStats> {
        self.lock()
            .get(source_ip)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(format!("device {source_ip}")))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::sync::Arc;
    use std::thread;

    fn entry(ip: &str, length: u64) -> LogEntry {
        LogEntry::new(ip, "a.com", "UDP", length, Local::now())
    }

    #[test]
    fn test_counts_match_entries_per_source() {
        let entries = vec![
            entry("10.0.0.5", 70),
            entry("10.0.0.6", 90),
            entry("10.0.0.5", 75),
            entry("10.0.0.5", 80),
        ];
        let table = DeviceStatsTable::from_entries(&entries);

        let first = table.get("10.0.0.5").unwrap();
        assert_eq!(first.packets_received, 3);
        assert_eq!(first.bytes_received, 225);

        let second = table.get("10.0.0.6").unwrap();
        assert_eq!(second.packets_received, 1);
        assert_eq!(second.bytes_received, 90);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let table = DeviceStatsTable::new();
        assert!(matches!(table.get("1.2.3.4"), Err(MonitorError::NotFound(_))));
    }

    #[test]
    fn test_first_and_last_seen() {
        let table = DeviceStatsTable::new();
        let mut early = entry("10.0.0.5", 60);
        early.timestamp = "2024-01-01 10:00:00".to_string();
        let mut late = entry("10.0.0.5", 60);
        late.timestamp = "2024-01-01 11:00:00".to_string();

        table.record(&early);
        table.record_observation(&late, Some("1.1.1.1"));

        let stats = table.get("10.0.0.5").unwrap();
        assert_eq!(stats.first_seen, "2024-01-01 10:00:00");
        assert_eq!(stats.last_seen, "2024-01-01 11:00:00");
        assert!(stats.distinct_destinations.contains("1.1.1.1"));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let table = Arc::new(DeviceStatsTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..250 {
                        table.record(&entry("10.0.0.5", 10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = table.get("10.0.0.5").unwrap();
        assert_eq!(stats.packets_received, 2000);
        assert_eq!(stats.bytes_received, 20000);
    }
}
