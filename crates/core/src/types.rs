use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Log severity levels, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /// Error and fatal entries count towards error rates and recent errors.
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Fatal)
    }

    /// Position in [`LogLevel::ALL`], usable as an array index.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            other => Err(CoreError::UnknownLevel(other.to_string())),
        }
    }
}

/// Process metadata stamped on every entry at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub hostname: String,
    pub pid: u32,
    pub version: String,
}

impl EntryMetadata {
    /// Metadata for the current process.
    pub fn current(version: impl Into<String>) -> Self {
        Self {
            hostname: detect_hostname(),
            pid: std::process::id(),
            version: version.into(),
        }
    }
}

fn detect_hostname() -> String {
    for var in ["LOGSTREAM_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = std::env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }
    match std::fs::read_to_string("/etc/hostname") {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        _ => "unknown".to_string(),
    }
}

/// A structured log entry. Immutable once built by the ingestion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    pub metadata: EntryMetadata,
}

pub const UNKNOWN_SERVICE: &str = "unknown";

impl LogEntry {
    /// Build an entry from a caller-supplied context.
    pub fn build(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        message: impl Into<String>,
        context: LogContext,
        metadata: EntryMetadata,
    ) -> Self {
        let tags = if context.tags.is_empty() {
            None
        } else {
            Some(context.tags)
        };
        Self {
            timestamp,
            level,
            message: message.into(),
            service: context
                .service
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNKNOWN_SERVICE.to_string()),
            request_id: context.request_id,
            user_id: context.user_id,
            session_id: context.session_id,
            stack: context.stack,
            context: context.data,
            tags,
            metadata,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_ref().is_some_and(|t| t.contains(tag))
    }
}

/// Optional bundle accompanying a `log()` call.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub service: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub stack: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub tags: BTreeSet<String>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Capture an error and its `source()` chain as the entry's stack.
    pub fn with_error(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut lines = vec![error.to_string()];
        let mut source = error.source();
        while let Some(cause) = source {
            lines.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        self.stack = Some(lines.join("\n"));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

impl From<&str> for LogContext {
    /// Shorthand for a context that only names the producing service.
    fn from(service: &str) -> Self {
        LogContext::new().service(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> EntryMetadata {
        EntryMetadata {
            hostname: "host-1".into(),
            pid: 42,
            version: "1.0.0".into(),
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert_eq!(LogLevel::Fatal.ordinal(), 4);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" error ".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_build_defaults_service() {
        let entry = LogEntry::build(
            Utc::now(),
            LogLevel::Info,
            "hello",
            LogContext::new(),
            metadata(),
        );
        assert_eq!(entry.service, UNKNOWN_SERVICE);
        assert!(entry.tags.is_none());
        assert!(entry.context.is_none());
    }

    #[test]
    fn test_context_builder() {
        let ctx = LogContext::new()
            .service("auth")
            .user_id("u-1")
            .field("attempt", 3)
            .tag("security");
        let entry = LogEntry::build(Utc::now(), LogLevel::Warn, "retry", ctx, metadata());
        assert_eq!(entry.service, "auth");
        assert_eq!(entry.user_id.as_deref(), Some("u-1"));
        assert_eq!(entry.context.unwrap()["attempt"], 3);
        assert!(entry.tags.unwrap().contains("security"));
    }

    #[test]
    fn test_with_error_captures_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml missing");
        let outer = CoreError::Io(inner);
        let ctx = LogContext::new().with_error(&outer);
        let stack = ctx.stack.unwrap();
        assert!(stack.starts_with("IO error: config.toml missing"));
    }

    #[test]
    fn test_entry_json_roundtrip() {
        let ctx = LogContext::new().service("api").request_id("r-9").tag("edge");
        let entry = LogEntry::build(Utc::now(), LogLevel::Error, "boom", ctx, metadata());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"level\":\"error\""));
        assert!(!json.contains("user_id"));
        let parsed: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
