pub mod device_stats;

pub use device_stats::DeviceStatsTable;
