use crate::models::LogEntry;

/// Byte-order mark prepended so spreadsheet tools detect UTF-8.
pub const UTF8_BOM: &str = "\u{feff}";
pub const NO_DATA_NOTICE: &str = "No data to export";
pub const CSV_FILENAME: &str = "dns_logs.csv";

/// Result of exporting the log store as CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvExport {
    /// The store was empty; callers show [`NO_DATA_NOTICE`] as plain text
    Empty,
    Csv(String),
}

impl CsvExport {
    pub fn content_type(&self) -> &'static str {
        match self {
            CsvExport::Empty => "text/plain",
            CsvExport::Csv(_) => "text/csv",
        }
    }

    /// Body to send or write: the CSV document, or the notice when empty.
    pub fn body(&self) -> &str {
        match self {
            CsvExport::Empty => NO_DATA_NOTICE,
            CsvExport::Csv(csv) => csv,
        }
    }
}

pub fn logs_to_csv(entries: &[LogEntry]) -> CsvExport {
    if entries.is_empty() {
        return CsvExport::Empty;
    }

    let mut csv_content = String::from(UTF8_BOM);
    csv_content.push_str(&LogEntry::field_names().join(","));
    csv_content.push_str("\r\n");

    for entry in entries {
        csv_content.push_str(&format!(
            "{},{},{},{},{}\r\n",
            escape_field(&entry.source_ip),
            escape_field(&entry.domain),
            escape_field(&entry.protocol),
            entry.length,
            escape_field(&entry.timestamp)
        ));
    }

    CsvExport::Csv(csv_content)
}

/// Quotes a field containing a delimiter, quote or line break, doubling inner quotes.
fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(domain: &str, length: u64) -> LogEntry {
        LogEntry {
            source_ip: "10.0.0.5".to_string(),
            domain: domain.to_string(),
            protocol: "UDP".to_string(),
            length,
            timestamp: "2024-03-01 12:00:00".to_string(),
        }
    }

    /// Minimal RFC 4180 reader for checking what `logs_to_csv` writes.
    fn parse_csv(document: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = document.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                ('"', _) => in_quotes = !in_quotes,
                (',', false) => row.push(std::mem::take(&mut field)),
                ('\r', false) => {}
                ('\n', false) => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                (c, _) => field.push(c),
            }
        }
        rows
    }

    #[test]
    fn test_empty_store_yields_notice() {
        let export = logs_to_csv(&[]);
        assert_eq!(export, CsvExport::Empty);
        assert_eq!(export.body(), "No data to export");
        assert_eq!(export.content_type(), "text/plain");
    }

    #[test]
    fn test_header_and_bom() {
        let CsvExport::Csv(csv) = logs_to_csv(&[entry("a.com", 70)]) else {
            panic!("expected csv");
        };
        assert!(csv.starts_with(UTF8_BOM));
        assert!(csv[UTF8_BOM.len()..].starts_with("ip,domain,protocol,length,time\r\n"));
        assert!(csv.ends_with("10.0.0.5,a.com,UDP,70,2024-03-01 12:00:00\r\n"));
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let entries = vec![
            entry("a.com", 70),
            entry("weird,\"name\".example", 1500),
            entry("b.com", 0),
        ];
        let export = logs_to_csv(&entries);
        let body = export.body().trim_start_matches(UTF8_BOM);
        let rows = parse_csv(body);

        assert_eq!(rows[0], LogEntry::field_names().map(String::from).to_vec());
        assert_eq!(rows.len(), entries.len() + 1);
        for (row, entry) in rows[1..].iter().zip(&entries) {
            assert_eq!(row[0], entry.source_ip);
            assert_eq!(row[1], entry.domain);
            assert_eq!(row[2], entry.protocol);
            assert_eq!(row[3].parse::<u64>().unwrap(), entry.length);
            assert_eq!(row[4], entry.timestamp);
        }
    }
}
