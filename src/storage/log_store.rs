//! Bounded, thread-safe history of accepted DNS log entries.
//!
//! All structural mutations (append with eviction, prune, clear) happen inside a
//! single mutex scope, so readers never observe a partially evicted sequence.
//! The capture thread, the maintenance tasks and request handlers share one
//! `Arc<LogStore>`.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use log::{debug, info, warn};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{LogEntry, MemoryStats};

#[derive(Debug)]
pub struct LogStore {
    max_logs: usize,
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: VecDeque<LogEntry>,
    /// Bumped on every mutation; lets the flush task skip unchanged stores
    revision: u64,
}

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub len: usize,
    pub evicted: usize,
}

impl LogStore {
    pub fn new(max_logs: usize) -> Self {
        Self {
            max_logs: max_logs.max(1),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Creates a store pre-filled with rehydrated entries, keeping only the newest
    /// `max_logs` of them.
    pub fn with_entries(max_logs: usize, entries: Vec<LogEntry>) -> Self {
        let store = Self::new(max_logs);
        {
            let mut inner = store.lock();
            let skip = entries.len().saturating_sub(store.max_logs);
            inner.entries.extend(entries.into_iter().skip(skip));
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs
    }

    /// Appends at the tail, evicting from the head until the capacity holds.
    pub fn append(&self, entry: LogEntry) -> AppendOutcome {
        let mut inner = self.lock();
        inner.entries.push_back(entry);

        let mut evicted = 0;
        while inner.entries.len() > self.max_logs {
            inner.entries.pop_front();
            evicted += 1;
        }
        inner.revision += 1;

        AppendOutcome {
            len: inner.entries.len(),
            evicted,
        }
    }

    /// Copy of the current sequence in insertion order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Snapshot together with the revision it was taken at.
    pub fn snapshot_with_revision(&self) -> (Vec<LogEntry>, u64) {
        let inner = self.lock();
        (inner.entries.iter().cloned().collect(), inner.revision)
    }

    /// Removes entries older than `now - max_age`.
    ///
    /// Entries whose timestamp does not parse are kept. A negative age, or one
    /// reaching past the earliest representable time, prunes nothing.
    pub fn prune(&self, now: NaiveDateTime, max_age: ChronoDuration) -> usize {
        if max_age < ChronoDuration::zero() {
            warn!("Ignoring negative log age {max_age}");
            return 0;
        }
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            debug!("Log age {max_age} reaches before the earliest timestamp, nothing to prune");
            return 0;
        };
        let mut inner = self.lock();
        let before = inner.entries.len();

        inner.entries.retain(|entry| match entry.captured_at() {
            Some(captured_at) => captured_at >= cutoff,
            None => true,
        });

        let removed = before - inner.entries.len();
        if removed > 0 {
            inner.revision += 1;
            info!("Pruned {removed} log entries older than {cutoff}");
        } else {
            debug!("Prune pass found nothing older than {cutoff}");
        }
        removed
    }

    /// Empties the store unconditionally, returning how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.revision += 1;
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Sorted, de-duplicated source addresses currently held.
    pub fn unique_sources(&self) -> Vec<String> {
        let inner = self.lock();
        inner
            .entries
            .iter()
            .filter(|entry| !entry.source_ip.is_empty())
            .map(|entry| entry.source_ip.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn memory_stats(&self, cleanup_threshold: usize) -> MemoryStats {
        MemoryStats::new(self.len(), self.max_logs, cleanup_threshold)
    }
}
