//! Sink registry and batch fanout.
//!
//! Each enabled sink receives the subset of a batch at or above its
//! `min_level`. Sinks are written concurrently and in isolation: an error or
//! panic in one sink is reported and never reaches the others.

use futures::future::join_all;
use futures::FutureExt;
use logstream_core::config::{SinkConfig, SinkKind};
use logstream_core::{LogEntry, LogLevel};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use crate::error::SinkError;
use crate::{build_sink, LogSink};

struct RegisteredSink {
    sink: Arc<dyn LogSink>,
    min_level: LogLevel,
    enabled: AtomicBool,
}

/// Snapshot of one registered sink's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkStatus {
    pub kind: SinkKind,
    pub min_level: LogLevel,
    pub enabled: bool,
}

/// Outcome of delivering one batch to one sink.
#[derive(Debug, Clone)]
pub struct SinkDelivery {
    pub kind: SinkKind,
    pub entries: usize,
    pub error: Option<String>,
}

/// Per-sink outcomes of one fanout. Sinks that were disabled or had nothing
/// to receive are absent.
#[derive(Debug, Clone, Default)]
pub struct FanoutReport {
    pub deliveries: Vec<SinkDelivery>,
}

impl FanoutReport {
    pub fn delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.error.is_none())
            .map(|d| d.entries)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SinkDelivery> {
        self.deliveries.iter().filter(|d| d.error.is_some())
    }
}

#[derive(Default)]
pub struct SinkRegistry {
    sinks: Vec<RegisteredSink>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured sink. Disabled sinks are still built so they
    /// can be toggled on later.
    pub fn from_configs(configs: &[SinkConfig]) -> Result<Self, SinkError> {
        let mut registry = Self::new();
        for config in configs {
            let sink = build_sink(config)?;
            registry.register(sink, config.min_level, config.enabled);
        }
        Ok(registry)
    }

    pub fn register(&mut self, sink: Arc<dyn LogSink>, min_level: LogLevel, enabled: bool) {
        self.sinks.push(RegisteredSink {
            sink,
            min_level,
            enabled: AtomicBool::new(enabled),
        });
    }

    /// Toggle every sink of the given kind. Returns how many were changed.
    pub fn set_enabled(&self, kind: SinkKind, enabled: bool) -> usize {
        self.sinks
            .iter()
            .filter(|s| s.sink.kind() == kind)
            .map(|s| s.enabled.swap(enabled, Ordering::SeqCst))
            .filter(|previous| *previous != enabled)
            .count()
    }

    pub fn statuses(&self) -> Vec<SinkStatus> {
        self.sinks
            .iter()
            .map(|s| SinkStatus {
                kind: s.sink.kind(),
                min_level: s.min_level,
                enabled: s.enabled.load(Ordering::SeqCst),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver a batch to every enabled sink.
    pub async fn fanout(&self, batch: &[Arc<LogEntry>]) -> FanoutReport {
        let deliveries = self.sinks.iter().filter_map(|registered| {
            if !registered.enabled.load(Ordering::SeqCst) {
                return None;
            }
            let subset: Vec<Arc<LogEntry>> = batch
                .iter()
                .filter(|e| e.level >= registered.min_level)
                .cloned()
                .collect();
            if subset.is_empty() {
                return None;
            }
            Some(deliver(registered.sink.clone(), subset))
        });

        FanoutReport {
            deliveries: join_all(deliveries).await,
        }
    }
}

async fn deliver(sink: Arc<dyn LogSink>, subset: Vec<Arc<LogEntry>>) -> SinkDelivery {
    let kind = sink.kind();
    let count = subset.len();
    let start = Instant::now();

    let result = AssertUnwindSafe(sink.write_batch(&subset))
        .catch_unwind()
        .await
        .unwrap_or(Err(SinkError::Panicked));

    match result {
        Ok(()) => {
            metrics::counter!("logstream.sink.delivered", "sink" => kind.as_str())
                .increment(count as u64);
            debug!(
                sink = %kind,
                count = count,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Delivered log batch"
            );
            SinkDelivery {
                kind,
                entries: count,
                error: None,
            }
        }
        Err(e) => {
            metrics::counter!("logstream.sink.failed", "sink" => kind.as_str()).increment(1);
            error!(sink = %kind, count = count, error = %e, "Failed to deliver log batch");
            SinkDelivery {
                kind,
                entries: count,
                error: Some(e.to_string()),
            }
        }
    }
}
