use logstream_core::LogEntry;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("CSV writer could not be flushed: {0}")]
    Flush(String),
}

const CSV_HEADERS: [&str; 12] = [
    "timestamp",
    "level",
    "service",
    "message",
    "request_id",
    "user_id",
    "session_id",
    "tags",
    "context",
    "hostname",
    "pid",
    "version",
];

/// Serialize entries as a JSON array or as CSV with a header row.
pub fn export_logs(entries: &[LogEntry], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        ExportFormat::Csv => to_csv(entries),
    }
}

fn to_csv(entries: &[LogEntry]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADERS)?;

    for entry in entries {
        let tags = entry
            .tags
            .as_ref()
            .map(|t| t.iter().cloned().collect::<Vec<_>>().join(";"))
            .unwrap_or_default();
        let context = match &entry.context {
            Some(ctx) => serde_json::to_string(ctx)?,
            None => String::new(),
        };
        writer.write_record([
            entry.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            entry.level.to_string(),
            entry.service.clone(),
            entry.message.clone(),
            entry.request_id.clone().unwrap_or_default(),
            entry.user_id.clone().unwrap_or_default(),
            entry.session_id.clone().unwrap_or_default(),
            tags,
            context,
            entry.metadata.hostname.clone(),
            entry.metadata.pid.to_string(),
            entry.metadata.version.clone(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use logstream_core::{EntryMetadata, LogContext, LogLevel};

    fn entry() -> LogEntry {
        LogEntry::build(
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            LogLevel::Error,
            "payment failed, retrying",
            LogContext::new()
                .service("billing")
                .user_id("u-1")
                .tag("payments")
                .field("attempt", 2),
            EntryMetadata {
                hostname: "node-a".into(),
                pid: 77,
                version: "2.1.0".into(),
            },
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let entries = vec![entry()];
        let json = export_logs(&entries, ExportFormat::Json).unwrap();
        let parsed: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn test_csv_layout() {
        let csv_text = export_logs(&[entry()], ExportFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), CSV_HEADERS.len());

        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "2024-03-01T08:30:00.000Z");
        assert_eq!(&record[1], "error");
        assert_eq!(&record[3], "payment failed, retrying");
        assert_eq!(&record[5], "u-1");
        assert_eq!(&record[7], "payments");
        assert_eq!(&record[8], r#"{"attempt":2}"#);
        assert_eq!(&record[10], "77");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
