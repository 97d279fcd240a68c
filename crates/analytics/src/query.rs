use logstream_core::{LogEntry, LogFilter};

pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Entries matching `filter`, newest first, at most `limit` of them.
///
/// `entries` is expected in ingestion order; among equal timestamps the
/// later-ingested entry sorts first.
pub fn query_logs<'a>(
    entries: impl DoubleEndedIterator<Item = &'a LogEntry>,
    filter: &LogFilter,
    limit: usize,
) -> Vec<LogEntry> {
    let mut matched: Vec<&LogEntry> = entries.rev().filter(|e| filter.matches(e)).collect();
    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matched.truncate(limit);
    matched.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use logstream_core::{EntryMetadata, LogContext, LogLevel};

    fn entries() -> Vec<LogEntry> {
        let t0 = Utc::now();
        let levels = [
            LogLevel::Info,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Error,
            LogLevel::Error,
            LogLevel::Debug,
        ];
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| {
                LogEntry::build(
                    t0 + Duration::seconds(i as i64),
                    *level,
                    format!("entry {i}"),
                    LogContext::from("api"),
                    EntryMetadata {
                        hostname: "h".into(),
                        pid: 1,
                        version: "0".into(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_level_filter_sorted_desc() {
        let entries = entries();
        let result = query_logs(
            entries.iter(),
            &LogFilter::new().levels([LogLevel::Error]),
            DEFAULT_QUERY_LIMIT,
        );
        let messages: Vec<&str> = result.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 4", "entry 3", "entry 1"]);
        assert!(result.iter().all(|e| e.level == LogLevel::Error));
    }

    #[test]
    fn test_limit_truncates() {
        let entries = entries();
        let result = query_logs(entries.iter(), &LogFilter::new(), 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].message, "entry 5");
    }
}
