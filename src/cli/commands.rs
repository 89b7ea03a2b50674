use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for the dns-watcher binary
/// Uses clap's derive macros for automatic CLI generation
#[derive(Parser)]
#[command(author = "Kaipo Chen")]
#[command(version)] // Automatically uses version from Cargo.toml
#[command(about = "DNS Watcher - record DNS queries seen on a network interface")]
#[command(long_about = "DNS Watcher captures DNS queries (UDP port 53) on a network interface, keeps a bounded \
in-memory log with per-device statistics, streams every new entry to the terminal and can persist the log \
to a JSON snapshot for later export.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List interfaces that can be captured on
    #[command(about = "List capture-capable network interfaces")]
    Interfaces,

    /// Live DNS capture on one interface
    #[command(about = "Capture DNS queries on a network interface")]
    #[command(long_about = "Starts a capture session on the given interface and prints every DNS query as it is \
recorded, plus a memory usage line every `stats_every` entries. Stops on Ctrl+C or after --duration, then prints \
per-device statistics and writes the snapshot when one is configured.\n\n\
Examples:\n  \
dnsw capture -I eth0                       # Capture until Ctrl+C\n  \
dnsw capture -I en0 --duration 5m          # Capture for five minutes\n  \
dnsw capture -I eth0 --snapshot logs.json  # Persist and rehydrate the log\n  \
dnsw capture -I eth0 --json                # One JSON event per line")]
    Capture {
        /// Network interface to capture on
        #[arg(short = 'I', long, help = "Network interface to capture on")]
        interface: String,

        /// Configuration file (TOML, JSON or YAML)
        #[arg(short, long, help = "Configuration file path")]
        config: Option<PathBuf>,

        /// Overrides `max_logs` from the configuration
        #[arg(long, help = "Maximum number of log entries kept in memory")]
        max_logs: Option<usize>,

        /// Overrides `snapshot_path` from the configuration
        #[arg(short, long, help = "JSON snapshot to rehydrate from and flush to")]
        snapshot: Option<PathBuf>,

        /// Capture duration, unlimited when absent
        #[arg(short, long, help = "Capture duration (e.g., 60s, 5m, 1h)")]
        duration: Option<String>,

        /// Print events as JSON lines instead of formatted text
        #[arg(long, help = "Print live events as JSON lines")]
        json: bool,
    },

    /// CSV export of a persisted snapshot
    #[command(about = "Export a snapshot as CSV")]
    Export {
        /// Snapshot written by a previous capture
        #[arg(short, long, help = "Snapshot file to export")]
        snapshot: PathBuf,

        /// Output file, stdout when absent; a directory gets `dns_logs.csv` inside it
        #[arg(short, long, help = "Output file or directory")]
        output: Option<PathBuf>,
    },

    /// Read-only views of a persisted snapshot
    #[command(about = "Show logs, unique sources or device statistics from a snapshot")]
    Show {
        /// Snapshot written by a previous capture
        #[arg(short, long, help = "Snapshot file to read")]
        snapshot: PathBuf,

        /// List distinct source addresses instead of the log
        #[arg(short, long, help = "Show unique source IPs")]
        unique_ips: bool,

        /// Show statistics for a single device
        #[arg(short = 'D', long, help = "Show statistics for one source IP")]
        device: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_capture_command() {
        let cli = Cli::try_parse_from([
            "dnsw", "capture", "-I", "eth0", "--max-logs", "50", "--duration", "30s", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Capture {
                interface,
                max_logs,
                duration,
                json,
                snapshot,
                ..
            } => {
                assert_eq!(interface, "eth0");
                assert_eq!(max_logs, Some(50));
                assert_eq!(duration.as_deref(), Some("30s"));
                assert!(json);
                assert!(snapshot.is_none());
            }
            _ => panic!("expected capture command"),
        }
    }

    #[test]
    fn test_capture_requires_interface() {
        assert!(Cli::try_parse_from(["dnsw", "capture"]).is_err());
    }

    #[test]
    fn test_parse_show_command() {
        let cli = Cli::try_parse_from(["dnsw", "show", "-s", "logs.json", "--device", "10.0.0.5"]).unwrap();
        match cli.command {
            Commands::Show {
                snapshot,
                unique_ips,
                device,
            } => {
                assert_eq!(snapshot, PathBuf::from("logs.json"));
                assert!(!unique_ips);
                assert_eq!(device.as_deref(), Some("10.0.0.5"));
            }
            _ => panic!("expected show command"),
        }
    }
}
