//! Request-level operations over [`CoreState`].
//!
//! Every method maps to one operation of the web adapter (`/logs`, `/start`,
//! `/device-stats/{ip}` ...) and returns a serde-ready response type, so any
//! transport can sit on top without touching the core.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::export::{logs_to_csv, CsvExport};
use crate::core::CoreState;
use crate::error::{MonitorError, Result};
use crate::models::{DeviceStats, LogEntry, MemoryStats};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub interface: Option<String>,
}

/// Response of `start` and `stop`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    pub memory_stats: MemoryStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub logs_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnifferStatus {
    pub alive: bool,
    pub memory_stats: MemoryStats,
}

/// Per-device statistics as reported to clients.
///
/// Only inbound DNS queries are observed, so the sent-side counters stay zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub first_seen: String,
    pub last_seen: String,
    pub active_connections: usize,
    pub protocols: BTreeMap<String, u64>,
}

impl From<&DeviceStats> for DeviceReport {
    fn from(stats: &DeviceStats) -> Self {
        Self {
            total_bytes_sent: 0,
            total_bytes_received: stats.bytes_received,
            packets_sent: 0,
            packets_received: stats.packets_received,
            first_seen: stats.first_seen.clone(),
            last_seen: stats.last_seen.clone(),
            active_connections: stats.distinct_destinations.len(),
            protocols: stats.protocol_counts.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MonitorApi {
    core: Arc<CoreState>,
}

impl MonitorApi {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<CoreState> {
        &self.core
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.core.capture().interfaces()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.core.store().snapshot()
    }

    pub fn unique_ips(&self) -> Vec<String> {
        self.core.store().unique_sources()
    }

    /// Serialises a snapshot; the store lock is not held while formatting.
    pub fn export_csv(&self) -> CsvExport {
        logs_to_csv(&self.core.store().snapshot())
    }

    pub async fn start(&self, request: StartRequest) -> Result<ControlResponse> {
        let interface = request
            .interface
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| MonitorError::InvalidArgument("no interface selected".to_string()))?;

        self.core.capture().start(&interface).await?;
        Ok(ControlResponse {
            status: "started",
            memory_stats: self.core.memory_stats(),
        })
    }

    pub async fn stop(&self) -> ControlResponse {
        self.core.capture().stop().await;
        ControlResponse {
            status: "stopped",
            memory_stats: self.core.memory_stats(),
        }
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.core.memory_stats()
    }

    /// Empties the log store. Device statistics are kept.
    pub fn clear_logs(&self) -> ClearResponse {
        let removed = self.core.store().clear();
        info!("Cleared {removed} log entries");
        ClearResponse {
            status: "cleared",
            logs_count: self.core.store().len(),
        }
    }

    pub fn sniffer_status(&self) -> SnifferStatus {
        SnifferStatus {
            alive: self.core.capture().status().alive,
            memory_stats: self.core.memory_stats(),
        }
    }

    pub fn device_stats(&self) -> BTreeMap<String, DeviceReport> {
        self.core
            .devices()
            .snapshot()
            .iter()
            .map(|(ip, stats)| (ip.clone(), DeviceReport::from(stats)))
            .collect()
    }

    pub fn device_stat(&self, ip: &str) -> Result<DeviceReport> {
        self.core.devices().get(ip).map(|stats| DeviceReport::from(&stats))
    }
}
