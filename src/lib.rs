//! DNS request watcher.
//!
//! Captures DNS queries on a network interface into a bounded in-memory log,
//! keeps per-device statistics and pushes every accepted entry to live observers.

pub mod analyzers;
pub mod api;
pub mod collectors;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;

pub use crate::api::MonitorApi;
pub use crate::config::MonitorConfig;
pub use crate::core::CoreState;
pub use crate::error::{MonitorError, Result, SourceError};
