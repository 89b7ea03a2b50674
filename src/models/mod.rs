pub mod device;
pub mod log_entry;
pub mod memory;

pub use device::DeviceStats;
pub use log_entry::{format_timestamp, protocol_name, LogEntry, TIMESTAMP_FORMAT};
pub use memory::MemoryStats;
