//! Human-readable line rendering shared by the console and file sinks.

use logstream_core::{LogEntry, LogLevel};
use std::fmt::Write;

const RESET: &str = "\x1b[0m";

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[90m",
        LogLevel::Info => "\x1b[32m",
        LogLevel::Warn => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
        LogLevel::Fatal => "\x1b[1;35m",
    }
}

/// `2024-05-01T12:00:00.000Z [ERROR] [payments] message key=value ...`
pub fn text_line(entry: &LogEntry, colorize: bool) -> String {
    let level = entry.level.as_str().to_uppercase();
    let mut line = String::with_capacity(entry.message.len() + 64);
    let ts = entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ");

    if colorize {
        let _ = write!(
            line,
            "{ts} {}[{level:<5}]{RESET} [{}] {}",
            level_color(entry.level),
            entry.service,
            entry.message
        );
    } else {
        let _ = write!(line, "{ts} [{level:<5}] [{}] {}", entry.service, entry.message);
    }

    if let Some(request_id) = &entry.request_id {
        let _ = write!(line, " request_id={request_id}");
    }
    if let Some(user_id) = &entry.user_id {
        let _ = write!(line, " user_id={user_id}");
    }
    if let Some(context) = &entry.context {
        for (key, value) in context {
            let _ = write!(line, " {key}={value}");
        }
    }
    if let Some(tags) = &entry.tags {
        let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
        let _ = write!(line, " tags={}", joined.join(","));
    }
    if let Some(stack) = &entry.stack {
        line.push('\n');
        line.push_str(stack);
    }
    line
}
