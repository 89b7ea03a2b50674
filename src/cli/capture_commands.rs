use anyhow::{Context, Result};
use dns_watcher::api::{DeviceReport, MonitorApi, StartRequest};
use dns_watcher::collectors::StopOutcome;
use dns_watcher::events::LiveEvent;
use dns_watcher::models::MemoryStats;
use log::warn;
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, sleep};

pub struct CaptureCommandHandler {
    api: MonitorApi,
}

impl CaptureCommandHandler {
    pub fn new(api: MonitorApi) -> Self {
        Self { api }
    }

    pub async fn handle_capture_command(
        &self,
        interface: &str,
        duration: Option<StdDuration>,
        json: bool,
    ) -> Result<()> {
        if !json {
            println!("⚠️  Note: Packet capture requires elevated privileges (sudo/administrator)");
            println!();
        }

        let mut events = self.api.core().subscribe();
        let response = self
            .api
            .start(StartRequest {
                interface: Some(interface.to_string()),
            })
            .await
            .context("Failed to start capture")?;

        if !json {
            println!("🔍 Capturing DNS queries on interface: {interface}");
            if let Some(duration) = duration {
                println!("📊 Capture duration: {duration:?}");
            }
            println!(
                "💾 {} entries restored, limit {}",
                response.memory_stats.logs_count, response.memory_stats.max_logs
            );
            println!("📡 Press Ctrl+C to stop\n");
        }

        let deadline = async {
            match duration {
                Some(duration) => sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut liveness = interval(StdDuration::from_secs(1));

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    if !json {
                        println!("\n🛑 Stopping capture...");
                    }
                    break;
                }
                _ = &mut deadline => {
                    if !json {
                        println!("⏰ Capture duration completed");
                    }
                    break;
                }
                _ = liveness.tick() => {
                    if !self.api.sniffer_status().alive {
                        eprintln!("❌ Capture on {interface} ended unexpectedly, see the log (RUST_LOG=info) for details");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => print_event(&event, json)?,
                    Err(RecvError::Lagged(skipped)) => warn!("Display fell behind, skipped {skipped} events"),
                    Err(RecvError::Closed) => break,
                }
            }
        }

        let outcome = self.api.core().shutdown().await;
        if json {
            return Ok(());
        }

        if outcome == StopOutcome::TimedOut {
            println!("⚠️  Capture thread did not stop in time");
        }
        print_device_summary(&self.api.device_stats());
        println!("✅ Capture finished with {} entries in memory", self.api.memory_stats().logs_count);
        Ok(())
    }
}

fn print_event(event: &LiveEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event).context("Failed to encode event")?);
        return Ok(());
    }

    match event {
        LiveEvent::NewLog(entry) => println!(
            "[{}] {:<15} → {} ({}, {} bytes)",
            entry.timestamp, entry.source_ip, entry.domain, entry.protocol, entry.length
        ),
        LiveEvent::MemoryStats(stats) => println!("{}", memory_line(stats)),
    }
    Ok(())
}

fn memory_line(stats: &MemoryStats) -> String {
    let mut line = format!(
        "📊 Memory: {}/{} logs ({:.1}%)",
        stats.logs_count, stats.max_logs, stats.memory_usage_percent
    );
    if stats.above_threshold() {
        line.push_str(&format!(" ⚠️  at or above cleanup threshold {}", stats.cleanup_threshold));
    }
    line
}

pub fn print_device_summary(devices: &BTreeMap<String, DeviceReport>) {
    if devices.is_empty() {
        println!("No devices observed");
        return;
    }

    println!("\n🌐 Devices:");
    println!("{}", "═".repeat(72));
    println!(
        "{:<18} {:>8} {:>10} {:>6}  {}",
        "Source IP", "Packets", "Bytes", "Dests", "Last seen"
    );
    for (ip, report) in devices {
        println!(
            "{:<18} {:>8} {:>10} {:>6}  {}",
            ip,
            report.packets_received,
            report.total_bytes_received,
            report.active_connections,
            report.last_seen
        );
    }
    println!();
}

/// Parses `30`, `30s`, `5m` or `1h` into a duration.
pub fn parse_duration(duration_str: &str) -> Result<StdDuration> {
    let duration_str = duration_str.trim();

    if let Some(seconds) = duration_str.strip_suffix('s') {
        let seconds: u64 = seconds.parse().context("Invalid seconds format")?;
        Ok(StdDuration::from_secs(seconds))
    } else if let Some(minutes) = duration_str.strip_suffix('m') {
        let minutes: u64 = minutes.parse().context("Invalid minutes format")?;
        Ok(StdDuration::from_secs(minutes * 60))
    } else if let Some(hours) = duration_str.strip_suffix('h') {
        let hours: u64 = hours.parse().context("Invalid hours format")?;
        Ok(StdDuration::from_secs(hours * 3600))
    } else {
        // Assume seconds if no unit
        let seconds: u64 = duration_str.parse().context("Invalid duration format")?;
        Ok(StdDuration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45").unwrap(), StdDuration::from_secs(45));
        assert_eq!(parse_duration("30s").unwrap(), StdDuration::from_secs(30));
        assert_eq!(parse_duration(" 5m ").unwrap(), StdDuration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), StdDuration::from_secs(7200));
    }

    #[test]
    fn test_memory_line_flags_threshold() {
        let below = memory_line(&MemoryStats::new(10, 100, 80));
        assert!(below.contains("10/100 logs (10.0%)"));
        assert!(!below.contains("threshold"));

        let above = memory_line(&MemoryStats::new(80, 100, 80));
        assert!(above.contains("cleanup threshold 80"));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("").is_err());
    }
}
