//! Runtime configuration for the DNS watcher.
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `DNS_WATCHER_*` environment variables. The CLI applies its own flags on top.

use config::{Config, Environment, File, Map};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, Result};

pub const ENV_PREFIX: &str = "DNS_WATCHER";

/// Longest accepted log age: one hundred years.
pub const MAX_LOG_AGE_HOURS: u64 = 100 * 365 * 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum number of entries held by the log store
    pub max_logs: usize,
    /// Entries older than this are pruned by the maintenance task
    pub max_log_age_hours: u64,
    /// How often the prune pass runs
    pub cleanup_interval_secs: u64,
    /// Store size at which a memory warning is logged
    pub memory_warning_threshold: usize,
    /// Memory stats are pushed to observers every N accepted entries
    pub stats_every: u64,
    /// Events buffered per observer before the slowest ones start dropping
    pub event_buffer: usize,
    /// Upper bound on how long `stop` waits for the capture loop
    pub stop_timeout_ms: u64,
    /// Packet source read timeout; the loop checks for stop requests at this cadence
    pub poll_interval_ms: u64,
    /// Re-open attempts after an unexpected source failure
    pub max_restart_attempts: u32,
    /// Delay before the first re-open attempt, doubled for each following one
    pub restart_delay_ms: u64,
    /// JSON snapshot location; persistence is disabled when unset
    pub snapshot_path: Option<PathBuf>,
    pub flush_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_logs: 1000,
            max_log_age_hours: 24,
            cleanup_interval_secs: 300,
            memory_warning_threshold: 800,
            stats_every: 100,
            event_buffer: 1024,
            stop_timeout_ms: 3000,
            poll_interval_ms: 500,
            max_restart_attempts: 1,
            restart_delay_ms: 2000,
            snapshot_path: None,
            flush_interval_secs: 30,
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`load`](Self::load), reading variables from `env` instead of the
    /// process environment when given.
    fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: MonitorConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_logs", self.max_logs as u64),
            ("stats_every", self.stats_every),
            ("event_buffer", self.event_buffer as u64),
            ("cleanup_interval_secs", self.cleanup_interval_secs),
            ("flush_interval_secs", self.flush_interval_secs),
            ("poll_interval_ms", self.poll_interval_ms),
        ];

        for (key, value) in positive {
            if value == 0 {
                return Err(MonitorError::Config(format!("{key} must be greater than 0")));
            }
        }

        if self.max_log_age_hours > MAX_LOG_AGE_HOURS {
            return Err(MonitorError::Config(format!(
                "max_log_age_hours must be at most {MAX_LOG_AGE_HOURS}"
            )));
        }
        Ok(())
    }

    pub fn max_log_age(&self) -> chrono::Duration {
        let hours = self.max_log_age_hours.min(MAX_LOG_AGE_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.max_logs, 1000);
        assert_eq!(config.max_log_age(), chrono::Duration::hours(24));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(300));
        assert_eq!(config.stop_timeout(), Duration::from_secs(3));
        assert_eq!(config.stats_every, 100);
        assert!(config.snapshot_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "max_logs = 50\nstats_every = 10\nsnapshot_path = \"/tmp/dns.json\"").unwrap();

        let config = MonitorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_logs, 50);
        assert_eq!(config.stats_every, 10);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/dns.json")));
        assert_eq!(config.memory_warning_threshold, 800);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = MonitorConfig {
            max_logs: 0,
            ..MonitorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_logs"));
    }

    #[test]
    fn test_out_of_range_log_age_is_rejected() {
        for hours in [MAX_LOG_AGE_HOURS + 1, 3_000_000_000, u64::MAX] {
            let config = MonitorConfig {
                max_log_age_hours: hours,
                ..MonitorConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("max_log_age_hours"));
            assert!(config.max_log_age() > chrono::Duration::zero());
        }

        let config = MonitorConfig {
            max_log_age_hours: MAX_LOG_AGE_HOURS,
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    fn env(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config =
            MonitorConfig::load_with_env(None, Some(env(&[("DNS_WATCHER_MAX_LOGS", "2000")]))).unwrap();
        assert_eq!(config.max_logs, 2000);
        assert_eq!(config.stats_every, 100);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "max_logs = 50\nstats_every = 10").unwrap();

        let config = MonitorConfig::load_with_env(
            Some(file.path()),
            Some(env(&[
                ("DNS_WATCHER_MAX_LOGS", "2000"),
                ("UNRELATED_MAX_LOGS", "7"),
            ])),
        )
        .unwrap();
        assert_eq!(config.max_logs, 2000);
        assert_eq!(config.stats_every, 10);
    }

    #[test]
    fn test_invalid_environment_value_is_rejected() {
        let result =
            MonitorConfig::load_with_env(None, Some(env(&[("DNS_WATCHER_MAX_LOG_AGE_HOURS", "3000000000")])));
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = MonitorConfig::load(Some(Path::new("/nonexistent/dns-watcher.toml")));
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }
}
