//! Read-side query descriptor.
//!
//! Each populated field is an OR-group; populated groups are ANDed together.
//! An empty group places no constraint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LogEntry, LogLevel};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub levels: Vec<LogLevel>,
    /// Substring match against the entry's service.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// Case-insensitive substring match against the message.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    pub fn services<S: Into<String>>(mut self, services: impl IntoIterator<Item = S>) -> Self {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn user_ids<S: Into<String>>(mut self, user_ids: impl IntoIterator<Item = S>) -> Self {
        self.user_ids = user_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        if !self.services.is_empty()
            && !self.services.iter().any(|s| entry.service.contains(s.as_str()))
        {
            return false;
        }
        if self.start.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        if !self.keywords.is_empty() && !contains_any_keyword(&entry.message, &self.keywords) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.has_tag(t)) {
            return false;
        }
        if !self.user_ids.is_empty() {
            let Some(user_id) = entry.user_id.as_deref() else {
                return false;
            };
            if !self.user_ids.iter().any(|u| u == user_id) {
                return false;
            }
        }
        true
    }
}

/// Case-insensitive "any keyword is a substring of the message".
pub fn contains_any_keyword(message: &str, keywords: &[String]) -> bool {
    let haystack = message.to_lowercase();
    keywords
        .iter()
        .any(|k| haystack.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryMetadata, LogContext};
    use chrono::Duration;

    fn entry(level: LogLevel, service: &str, msg: &str, ctx: LogContext) -> LogEntry {
        LogEntry::build(
            Utc::now(),
            level,
            msg,
            ctx.service(service),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let e = entry(LogLevel::Debug, "api", "anything", LogContext::new());
        assert!(LogFilter::new().matches(&e));
    }

    #[test]
    fn test_groups_are_anded() {
        let e = entry(LogLevel::Error, "payment-api", "Card DECLINED", LogContext::new());
        let f = LogFilter::new()
            .levels([LogLevel::Warn, LogLevel::Error])
            .services(["payment"])
            .keywords(["timeout", "declined"]);
        assert!(f.matches(&e));

        let f = f.levels([LogLevel::Fatal]);
        assert!(!f.matches(&e));
    }

    #[test]
    fn test_time_range() {
        let e = entry(LogLevel::Info, "api", "x", LogContext::new());
        let inside = LogFilter::new().between(
            e.timestamp - Duration::seconds(1),
            e.timestamp + Duration::seconds(1),
        );
        assert!(inside.matches(&e));
        let before = LogFilter::new().between(
            e.timestamp - Duration::seconds(10),
            e.timestamp - Duration::seconds(5),
        );
        assert!(!before.matches(&e));
    }

    #[test]
    fn test_tags_and_users() {
        let e = entry(
            LogLevel::Info,
            "api",
            "x",
            LogContext::new().tag("billing").user_id("u-7"),
        );
        assert!(LogFilter::new().tags(["audit", "billing"]).matches(&e));
        assert!(!LogFilter::new().tags(["audit"]).matches(&e));
        assert!(LogFilter::new().user_ids(["u-7"]).matches(&e));

        let anonymous = entry(LogLevel::Info, "api", "x", LogContext::new());
        assert!(!LogFilter::new().user_ids(["u-7"]).matches(&anonymous));
    }
}
