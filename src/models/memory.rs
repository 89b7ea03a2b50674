use serde::{Deserialize, Serialize};

/// Occupancy of the bounded log store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub logs_count: usize,
    pub max_logs: usize,
    pub memory_usage_percent: f64,
    pub cleanup_threshold: usize,
}

impl MemoryStats {
    pub fn new(logs_count: usize, max_logs: usize, cleanup_threshold: usize) -> Self {
        let memory_usage_percent = if max_logs == 0 {
            0.0
        } else {
            logs_count as f64 / max_logs as f64 * 100.0
        };

        Self {
            logs_count,
            max_logs,
            memory_usage_percent,
            cleanup_threshold,
        }
    }

    pub fn above_threshold(&self) -> bool {
        self.logs_count >= self.cleanup_threshold
    }
}
