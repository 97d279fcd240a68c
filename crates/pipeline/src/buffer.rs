//! Bounded in-memory entry buffer.
//!
//! Two sequences share one overflow policy: the retained history read by
//! queries, analytics and cleanup, and the pending batch handed to the sinks
//! on each flush. When either grows past `capacity` its oldest entries are
//! discarded until only the `retain` most recent remain.

use chrono::{DateTime, Utc};
use logstream_core::config::BufferConfig;
use logstream_core::LogEntry;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct LogBuffer {
    capacity: usize,
    retain: usize,
    retained: VecDeque<Arc<LogEntry>>,
    pending: Vec<Arc<LogEntry>>,
    dropped: u64,
}

impl LogBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            retain: config.retain.min(capacity),
            retained: VecDeque::new(),
            pending: Vec::new(),
            dropped: 0,
        }
    }

    /// Append an entry. Returns how many pending entries were discarded
    /// undelivered because of overflow.
    pub fn push(&mut self, entry: Arc<LogEntry>) -> usize {
        self.retained.push_back(entry.clone());
        if self.retained.len() > self.capacity {
            let excess = self.retained.len() - self.retain;
            self.retained.drain(..excess);
        }

        self.pending.push(entry);
        if self.pending.len() > self.capacity {
            let excess = self.pending.len() - self.retain;
            self.pending.drain(..excess);
            self.dropped += excess as u64;
            return excess;
        }
        0
    }

    /// Swap out the pending batch for an empty one.
    pub fn take_pending(&mut self) -> Vec<Arc<LogEntry>> {
        std::mem::take(&mut self.pending)
    }

    /// Drop retained entries older than `cutoff`. Pending entries are still
    /// delivered. Returns how many were removed.
    pub fn cleanup(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.retained.len();
        self.retained.retain(|e| e.timestamp >= cutoff);
        before - self.retained.len()
    }

    /// Retained entries in ingestion order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.retained.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Entries discarded before any sink saw them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
