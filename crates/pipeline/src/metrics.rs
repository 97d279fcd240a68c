//! Running counters updated on every ingest and every flush.

use chrono::{DateTime, Utc};
use logstream_core::config::MetricsConfig;
use logstream_core::{LogEntry, LogLevel};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// Moving average of flush batch duration, in milliseconds.
    pub avg_processing_time_ms: f64,
    /// Entries per second of the last flushed batch.
    pub throughput: f64,
    /// Entries currently retained in the buffer.
    pub buffer_size: usize,
}

/// Point-in-time copy of the running counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogMetrics {
    pub total_logs: u64,
    pub by_level: BTreeMap<LogLevel, u64>,
    pub by_service: BTreeMap<String, u64>,
    /// `(error + fatal) / total * 100`, or 0 with no entries.
    pub error_rate: f64,
    /// Most recent error and fatal entries, oldest first.
    pub recent_errors: Vec<LogEntry>,
    pub performance: PerformanceMetrics,
    /// Entries discarded by buffer overflow before delivery.
    pub dropped: u64,
    pub flushes: u64,
}

pub struct MetricsRecorder {
    total: u64,
    by_level: [u64; LogLevel::ALL.len()],
    // TODO: cap per-service cardinality once a bound for service names is chosen.
    by_service: HashMap<String, u64>,
    error_rate: f64,
    recent_errors: VecDeque<Arc<LogEntry>>,
    recent_errors_cap: usize,
    recent_errors_retain: usize,
    avg_processing_ms: Option<f64>,
    throughput: f64,
    flushes: u64,
}

impl MetricsRecorder {
    pub fn new(config: &MetricsConfig) -> Self {
        let cap = config.recent_errors_cap.max(1);
        Self {
            total: 0,
            by_level: [0; LogLevel::ALL.len()],
            by_service: HashMap::new(),
            error_rate: 0.0,
            recent_errors: VecDeque::new(),
            recent_errors_cap: cap,
            recent_errors_retain: config.recent_errors_retain.min(cap),
            avg_processing_ms: None,
            throughput: 0.0,
            flushes: 0,
        }
    }

    pub fn record(&mut self, entry: &Arc<LogEntry>) {
        self.total += 1;
        self.by_level[entry.level.ordinal()] += 1;
        *self.by_service.entry(entry.service.clone()).or_insert(0) += 1;

        let errors =
            self.by_level[LogLevel::Error.ordinal()] + self.by_level[LogLevel::Fatal.ordinal()];
        self.error_rate = errors as f64 / self.total as f64 * 100.0;

        if entry.level.is_error() {
            self.recent_errors.push_back(entry.clone());
            if self.recent_errors.len() > self.recent_errors_cap {
                let excess = self.recent_errors.len() - self.recent_errors_retain;
                self.recent_errors.drain(..excess);
            }
        }
    }

    /// Fold one completed flush into the performance figures.
    pub fn record_flush(&mut self, batch_len: usize, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.avg_processing_ms = Some(match self.avg_processing_ms {
            Some(avg) => (avg + ms) / 2.0,
            None => ms,
        });
        let secs = elapsed.as_secs_f64();
        self.throughput = if secs > 0.0 {
            batch_len as f64 / secs
        } else {
            batch_len as f64
        };
        self.flushes += 1;
    }

    /// Drop recent errors older than `cutoff`. Counters are cumulative and
    /// unaffected.
    pub fn cleanup(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.recent_errors.len();
        self.recent_errors.retain(|e| e.timestamp >= cutoff);
        before - self.recent_errors.len()
    }

    pub fn snapshot(&self, buffer_size: usize, dropped: u64) -> LogMetrics {
        LogMetrics {
            total_logs: self.total,
            by_level: LogLevel::ALL
                .iter()
                .map(|level| (*level, self.by_level[level.ordinal()]))
                .collect(),
            by_service: self
                .by_service
                .iter()
                .map(|(service, count)| (service.clone(), *count))
                .collect(),
            error_rate: self.error_rate,
            recent_errors: self
                .recent_errors
                .iter()
                .map(|e| e.as_ref().clone())
                .collect(),
            performance: PerformanceMetrics {
                avg_processing_time_ms: self.avg_processing_ms.unwrap_or(0.0),
                throughput: self.throughput,
                buffer_size,
            },
            dropped,
            flushes: self.flushes,
        }
    }
}
