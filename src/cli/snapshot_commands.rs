use anyhow::{Context, Result};
use dns_watcher::analyzers::DeviceStatsTable;
use dns_watcher::api::{logs_to_csv, CsvExport, DeviceReport, CSV_FILENAME};
use dns_watcher::models::LogEntry;
use dns_watcher::storage::{LogStore, SnapshotFile};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::capture_commands::print_device_summary;

fn read_snapshot(path: &Path) -> Result<Vec<LogEntry>> {
    SnapshotFile::new(path)
        .read()
        .with_context(|| format!("Failed to read snapshot {}", path.display()))
}

/// A directory target gets the default export file name inside it.
fn export_path(output: &Path) -> PathBuf {
    if output.is_dir() {
        output.join(CSV_FILENAME)
    } else {
        output.to_path_buf()
    }
}

pub fn handle_export_command(snapshot: &Path, output: Option<&Path>) -> Result<()> {
    let entries = read_snapshot(snapshot)?;
    let export = logs_to_csv(&entries);

    match (output, &export) {
        (_, CsvExport::Empty) => println!("{}", export.body()),
        (Some(output), CsvExport::Csv(csv)) => {
            let output = export_path(output);
            fs::write(&output, csv)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✅ Exported {} entries to {}", entries.len(), output.display());
        }
        (None, CsvExport::Csv(csv)) => print!("{csv}"),
    }
    Ok(())
}

pub fn handle_show_command(snapshot: &Path, unique_ips: bool, device: Option<&str>) -> Result<()> {
    let entries = read_snapshot(snapshot)?;

    if let Some(ip) = device {
        let devices = DeviceStatsTable::from_entries(&entries);
        let report = DeviceReport::from(&devices.get(ip)?);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if unique_ips {
        let store = LogStore::with_entries(entries.len().max(1), entries);
        for ip in store.unique_sources() {
            println!("{ip}");
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries in {}", snapshot.display());
        return Ok(());
    }

    println!("{:<19}  {:<15}  {:<8} {:>6}  {}", "Time", "Source IP", "Protocol", "Length", "Domain");
    println!("{}", "═".repeat(72));
    for entry in &entries {
        println!(
            "{:<19}  {:<15}  {:<8} {:>6}  {}",
            entry.timestamp, entry.source_ip, entry.protocol, entry.length, entry.domain
        );
    }

    let reports: BTreeMap<_, _> = DeviceStatsTable::from_entries(&entries)
        .snapshot()
        .iter()
        .map(|(ip, stats)| (ip.clone(), DeviceReport::from(stats)))
        .collect();
    print_device_summary(&reports);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use tempfile::tempdir;

    #[test]
    fn test_export_into_directory_uses_default_name() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("logs.json");
        SnapshotFile::new(&snapshot)
            .save(&[LogEntry::new("10.0.0.5", "a.com", "UDP", 70, Local::now())])
            .unwrap();

        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();
        handle_export_command(&snapshot, Some(&out_dir)).unwrap();

        let csv = fs::read_to_string(out_dir.join(CSV_FILENAME)).unwrap();
        assert!(csv.contains("10.0.0.5,a.com,UDP,70,"));
    }

    #[test]
    fn test_export_to_file_path_is_kept() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("custom.csv");
        assert_eq!(export_path(&target), target);
    }
}
