pub mod capture_commands;
pub mod commands;
pub mod snapshot_commands;

pub use capture_commands::{parse_duration, CaptureCommandHandler};
pub use commands::{Cli, Commands};
