use log::{info, warn};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};
use crate::models::LogEntry;

/// JSON array of log entries on disk, rewritten in full on every flush.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the snapshot strictly, surfacing I/O and parse failures.
    pub fn read(&self) -> Result<Vec<LogEntry>> {
        let file = fs::File::open(&self.path).map_err(|e| self.failure("read", e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| self.failure("parsed", e))
    }

    /// Best-effort load used at startup: a missing or corrupt file yields no entries.
    pub fn load(&self) -> Vec<LogEntry> {
        if !self.path.exists() {
            info!("No snapshot at {}, starting empty", self.path.display());
            return Vec::new();
        }

        match self.read() {
            Ok(entries) => {
                info!("Rehydrated {} log entries from {}", entries.len(), self.path.display());
                entries
            }
            Err(e) => {
                warn!("Ignoring unreadable snapshot: {e}");
                Vec::new()
            }
        }
    }

    /// Writes the entries to a sibling temp file and renames it into place.
    pub fn save(&self, entries: &[LogEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.failure("written", e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let file = fs::File::create(&tmp_path).map_err(|e| self.failure("written", e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, entries).map_err(|e| self.failure("written", e))?;
        writer.flush().map_err(|e| self.failure("written", e))?;
        drop(writer);

        fs::rename(&tmp_path, &self.path).map_err(|e| self.failure("written", e))
    }

    fn failure(&self, action: &'static str, reason: impl ToString) -> MonitorError {
        MonitorError::Persistence {
            path: self.path.clone(),
            action,
            reason: reason.to_string(),
        }
    }
}
