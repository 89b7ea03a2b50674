mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::snapshot_commands::{handle_export_command, handle_show_command};
use cli::{parse_duration, CaptureCommandHandler, Cli, Commands};
use dns_watcher::collectors::{PacketSourceFactory, PnetSourceFactory};
use dns_watcher::{CoreState, MonitorApi, MonitorConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Interfaces => {
            let factory = PnetSourceFactory::new(Duration::from_millis(500));
            let interfaces = factory.interfaces();
            if interfaces.is_empty() {
                println!("No network interfaces found");
            }
            for name in interfaces {
                println!("{name}");
            }
        }
        Commands::Capture {
            interface,
            config,
            max_logs,
            snapshot,
            duration,
            json,
        } => {
            let mut config =
                MonitorConfig::load(config.as_deref()).context("Failed to load configuration")?;
            if let Some(max_logs) = max_logs {
                config.max_logs = max_logs;
            }
            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }
            let duration = duration.as_deref().map(parse_duration).transpose()?;

            let factory = Arc::new(PnetSourceFactory::new(config.poll_interval()));
            let core = CoreState::new(config, factory).context("Failed to initialise DNS watcher")?;
            let core = Arc::new(core);
            core.spawn_maintenance();

            CaptureCommandHandler::new(MonitorApi::new(core))
                .handle_capture_command(&interface, duration, json)
                .await?;
        }
        Commands::Export { snapshot, output } => {
            handle_export_command(&snapshot, output.as_deref())?;
        }
        Commands::Show {
            snapshot,
            unique_ips,
            device,
        } => {
            handle_show_command(&snapshot, unique_ips, device.as_deref())?;
        }
    }

    Ok(())
}
