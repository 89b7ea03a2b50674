use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp layout used for every recorded entry (second precision, local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// IANA protocol number for UDP.
pub const IP_PROTOCOL_UDP: u8 = 17;

/// One observed DNS query.
///
/// Field names on the wire (`ip`, `time`) match the JSON snapshot and CSV export
/// layout so that existing `logs.json` files can be rehydrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Network-layer source address of the querying device
    #[serde(rename = "ip")]
    pub source_ip: String,
    /// Queried name with the trailing dot stripped
    pub domain: String,
    /// `"UDP"` or the decimal transport protocol number
    pub protocol: String,
    /// Wire length of the captured frame in bytes
    pub length: u64,
    /// Local capture time formatted with [`TIMESTAMP_FORMAT`]
    #[serde(rename = "time")]
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(
        source_ip: impl Into<String>,
        domain: impl Into<String>,
        protocol: impl Into<String>,
        length: u64,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            source_ip: source_ip.into(),
            domain: domain.into(),
            protocol: protocol.into(),
            length,
            timestamp: format_timestamp(captured_at.naive_local()),
        }
    }

    /// Parses the stored timestamp, returning `None` for malformed values.
    pub fn captured_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT).ok()
    }

    /// Field names in serialization order, used as the CSV header.
    pub fn field_names() -> [&'static str; 5] {
        ["ip", "domain", "protocol", "length", "time"]
    }
}

pub fn format_timestamp(time: NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Renders a transport protocol number the way entries record it.
pub fn protocol_name(protocol: u8) -> String {
    if protocol == IP_PROTOCOL_UDP {
        "UDP".to_string()
    } else {
        protocol.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_serializes_with_wire_names() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let entry = LogEntry::new("10.0.0.5", "example.com", "UDP", 74, time);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["ip"], "10.0.0.5");
        assert_eq!(json["domain"], "example.com");
        assert_eq!(json["protocol"], "UDP");
        assert_eq!(json["length"], 74);
        assert_eq!(json["time"], "2024-03-09 14:05:07");
    }

    #[test]
    fn test_captured_at_rejects_malformed_timestamp() {
        let mut entry = LogEntry::new("10.0.0.5", "a.com", "UDP", 60, Local::now());
        assert!(entry.captured_at().is_some());

        entry.timestamp = "yesterday-ish".to_string();
        assert!(entry.captured_at().is_none());
    }

    #[test]
    fn test_protocol_name() {
        assert_eq!(protocol_name(17), "UDP");
        assert_eq!(protocol_name(6), "6");
        assert_eq!(protocol_name(0), "0");
    }
}
