pub mod export;
pub mod facade;

pub use export::{logs_to_csv, CsvExport, CSV_FILENAME, NO_DATA_NOTICE, UTF8_BOM};
pub use facade::{
    ClearResponse, ControlResponse, DeviceReport, MonitorApi, SnifferStatus, StartRequest,
};
