//! On-demand analytics over the trailing window.
//!
//! The window is `window_secs` long and ends at the supplied `now`. It is
//! split into `bucket_count` equal buckets for the error trend. Entries
//! outside `[now - window, now]` are ignored by every section.

use chrono::{DateTime, Duration, Utc};
use logstream_core::config::AnalyticsConfig;
use logstream_core::{saturating_secs, saturating_sub, LogEntry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Error rate (percent) at or above which a service is critical.
pub const CRITICAL_ERROR_RATE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    /// Start of the bucket.
    pub timestamp: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn from_error_rate(rate: f64) -> Self {
        if rate <= 0.0 {
            HealthStatus::Healthy
        } else if rate < CRITICAL_ERROR_RATE {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    /// Percentage of the service's entries that are error or fatal.
    pub error_rate: f64,
    pub last_error: Option<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotIssue {
    pub message: String,
    pub count: usize,
    pub services: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub login_count: usize,
    pub error_count: usize,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogAnalytics {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub error_trend: Vec<TrendBucket>,
    pub service_health: BTreeMap<String, ServiceHealth>,
    pub hot_issues: Vec<HotIssue>,
    pub user_activity: BTreeMap<String, UserActivity>,
}

#[derive(Default)]
struct ServiceTally {
    total: usize,
    errors: usize,
    last_error: Option<LogEntry>,
}

pub fn compute_analytics<'a>(
    entries: impl IntoIterator<Item = &'a LogEntry>,
    now: DateTime<Utc>,
    config: &AnalyticsConfig,
) -> LogAnalytics {
    let window = saturating_secs(config.window_secs);
    let window_start = saturating_sub(now, window);
    let bucket_count = config.bucket_count.max(1);
    let bucket_ms = ((now - window_start).num_milliseconds() / bucket_count as i64).max(1);
    let login_marker = config.login_marker.to_lowercase();

    let mut trend = vec![0usize; bucket_count];
    let mut services: HashMap<&str, ServiceTally> = HashMap::new();
    let mut issues: HashMap<&str, HotIssue> = HashMap::new();
    let mut users: BTreeMap<String, UserActivity> = BTreeMap::new();
    let mut scanned = 0usize;

    for entry in entries {
        if entry.timestamp < window_start || entry.timestamp > now {
            continue;
        }
        scanned += 1;
        let is_error = entry.level.is_error();

        let tally = services.entry(entry.service.as_str()).or_default();
        tally.total += 1;

        if is_error {
            let offset = (entry.timestamp - window_start).num_milliseconds();
            let index = ((offset / bucket_ms) as usize).min(bucket_count - 1);
            trend[index] += 1;

            tally.errors += 1;
            if tally
                .last_error
                .as_ref()
                .map_or(true, |last| entry.timestamp >= last.timestamp)
            {
                tally.last_error = Some(entry.clone());
            }

            let issue = issues
                .entry(entry.message.as_str())
                .or_insert_with(|| HotIssue {
                    message: entry.message.clone(),
                    count: 0,
                    services: BTreeSet::new(),
                    first_seen: entry.timestamp,
                    last_seen: entry.timestamp,
                });
            issue.count += 1;
            issue.services.insert(entry.service.clone());
            issue.first_seen = issue.first_seen.min(entry.timestamp);
            issue.last_seen = issue.last_seen.max(entry.timestamp);
        }

        if let Some(user_id) = &entry.user_id {
            let activity = users.entry(user_id.clone()).or_insert(UserActivity {
                login_count: 0,
                error_count: 0,
                last_activity: entry.timestamp,
            });
            if entry.message.to_lowercase().contains(&login_marker) {
                activity.login_count += 1;
            }
            if is_error {
                activity.error_count += 1;
            }
            activity.last_activity = activity.last_activity.max(entry.timestamp);
        }
    }

    let error_trend = trend
        .into_iter()
        .enumerate()
        .map(|(i, count)| TrendBucket {
            timestamp: Duration::try_milliseconds(bucket_ms.saturating_mul(i as i64))
                .and_then(|offset| window_start.checked_add_signed(offset))
                .unwrap_or(window_start),
            count,
        })
        .collect();

    let service_health = services
        .into_iter()
        .map(|(service, tally)| {
            let error_rate = tally.errors as f64 / tally.total as f64 * 100.0;
            (
                service.to_string(),
                ServiceHealth {
                    status: HealthStatus::from_error_rate(error_rate),
                    error_rate,
                    last_error: tally.last_error,
                },
            )
        })
        .collect();

    let mut hot_issues: Vec<HotIssue> = issues.into_values().collect();
    hot_issues.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
            .then_with(|| a.message.cmp(&b.message))
    });
    hot_issues.truncate(config.hot_issue_limit);

    debug!(scanned, window_secs = config.window_secs, "Computed log analytics");

    LogAnalytics {
        window_start,
        window_end: now,
        error_trend,
        service_health,
        hot_issues,
        user_activity: users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use logstream_core::{EntryMetadata, LogContext, LogLevel};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn entry(secs_ago: i64, level: LogLevel, service: &str, msg: &str) -> LogEntry {
        LogEntry::build(
            now() - Duration::seconds(secs_ago),
            level,
            msg,
            LogContext::from(service),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        )
    }

    fn user_entry(secs_ago: i64, level: LogLevel, user: &str, msg: &str) -> LogEntry {
        let mut e = entry(secs_ago, level, "auth", msg);
        e.user_id = Some(user.to_string());
        e
    }

    fn config() -> AnalyticsConfig {
        AnalyticsConfig {
            window_secs: 3600,
            bucket_count: 12,
            hot_issue_limit: 10,
            login_marker: "login".into(),
        }
    }

    #[test]
    fn test_error_trend_buckets() {
        let entries = vec![
            entry(3599, LogLevel::Error, "api", "a"),
            entry(3000, LogLevel::Fatal, "api", "b"),
            entry(10, LogLevel::Error, "api", "c"),
            entry(0, LogLevel::Error, "api", "d"),
            entry(5, LogLevel::Info, "api", "ignored"),
            entry(7200, LogLevel::Error, "api", "too old"),
        ];
        let analytics = compute_analytics(&entries, now(), &config());

        assert_eq!(analytics.error_trend.len(), 12);
        assert_eq!(analytics.error_trend[0].timestamp, now() - Duration::hours(1));
        assert_eq!(analytics.error_trend[0].count, 1);
        assert_eq!(analytics.error_trend[2].count, 1);
        assert_eq!(analytics.error_trend[11].count, 2);
        let total: usize = analytics.error_trend.iter().map(|b| b.count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_service_health_classification() {
        let mut entries = Vec::new();
        for i in 0..10 {
            entries.push(entry(i, LogLevel::Info, "healthy", "ok"));
        }
        for i in 0..99 {
            entries.push(entry(i, LogLevel::Info, "flaky", "ok"));
        }
        entries.push(entry(1, LogLevel::Error, "flaky", "timeout"));
        entries.push(entry(30, LogLevel::Info, "broken", "ok"));
        entries.push(entry(20, LogLevel::Error, "broken", "older"));
        entries.push(entry(10, LogLevel::Fatal, "broken", "newest"));

        let health = compute_analytics(&entries, now(), &config()).service_health;

        assert_eq!(health["healthy"].status, HealthStatus::Healthy);
        assert!(health["healthy"].last_error.is_none());
        assert_eq!(health["flaky"].status, HealthStatus::Warning);
        assert!((health["flaky"].error_rate - 1.0).abs() < 1e-9);
        assert_eq!(health["broken"].status, HealthStatus::Critical);
        assert_eq!(
            health["broken"].last_error.as_ref().unwrap().message,
            "newest"
        );
    }

    #[test]
    fn test_hot_issues_ranked_and_limited() {
        let mut entries = Vec::new();
        for i in 0..3 {
            entries.push(entry(100 + i, LogLevel::Error, "api", "db timeout"));
        }
        entries.push(entry(50, LogLevel::Error, "worker", "db timeout"));
        entries.push(entry(40, LogLevel::Error, "api", "cache miss storm"));
        for i in 0..12 {
            entries.push(entry(i, LogLevel::Error, "api", &format!("unique {i}")));
        }

        let issues = compute_analytics(&entries, now(), &config()).hot_issues;

        assert_eq!(issues.len(), 10);
        let top = &issues[0];
        assert_eq!(top.message, "db timeout");
        assert_eq!(top.count, 4);
        assert_eq!(
            top.services.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["api", "worker"]
        );
        assert_eq!(top.first_seen, now() - Duration::seconds(102));
        assert_eq!(top.last_seen, now() - Duration::seconds(50));
    }

    #[test]
    fn test_user_activity() {
        let entries = vec![
            user_entry(300, LogLevel::Info, "u1", "User Login succeeded"),
            user_entry(200, LogLevel::Error, "u1", "login failed"),
            user_entry(100, LogLevel::Warn, "u1", "slow request"),
            user_entry(50, LogLevel::Info, "u2", "viewed page"),
            entry(10, LogLevel::Error, "auth", "anonymous failure"),
        ];
        let users = compute_analytics(&entries, now(), &config()).user_activity;

        assert_eq!(users.len(), 2);
        assert_eq!(users["u1"].login_count, 2);
        assert_eq!(users["u1"].error_count, 1);
        assert_eq!(users["u1"].last_activity, now() - Duration::seconds(100));
        assert_eq!(users["u2"].login_count, 0);
    }

    #[test]
    fn test_unbounded_window() {
        let config = AnalyticsConfig {
            window_secs: u64::MAX,
            ..config()
        };
        let entries = vec![
            entry(86_400 * 365, LogLevel::Error, "api", "ancient"),
            entry(0, LogLevel::Error, "api", "fresh"),
        ];
        let analytics = compute_analytics(&entries, now(), &config);

        assert_eq!(analytics.window_start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(analytics.error_trend.len(), 12);
        assert_eq!(analytics.error_trend.iter().map(|b| b.count).sum::<usize>(), 2);
        assert_eq!(analytics.hot_issues.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let analytics = compute_analytics(std::iter::empty(), now(), &config());
        assert!(analytics.error_trend.iter().all(|b| b.count == 0));
        assert!(analytics.service_health.is_empty());
        assert!(analytics.hot_issues.is_empty());
    }
}
