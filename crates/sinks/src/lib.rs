//! Logstream sinks
//!
//! Delivery destinations for flushed log batches and the fanout layer that
//! feeds them.
//!
//! # Modules
//!
//! - [`console`]: line-formatted stdout output, optionally colorized or JSON
//! - [`file`]: JSON-lines or text file output with size-based rotation
//! - [`search_index`]: Elasticsearch-compatible `_bulk` submission
//! - [`aggregator`]: Loki-compatible push submission
//! - [`webhook`]: JSON batch POST to an arbitrary endpoint
//! - [`registry`]: per-sink level filtering and isolated fanout
//! - [`capture`]: in-memory sink for tests

pub mod aggregator;
pub mod capture;
pub mod console;
pub mod error;
pub mod file;
pub mod format;
mod http;
pub mod registry;
pub mod search_index;
pub mod webhook;

use async_trait::async_trait;
use logstream_core::config::{OutputConfig, SinkConfig, SinkKind};
use logstream_core::LogEntry;
use std::sync::Arc;

pub use capture::CaptureSink;
pub use error::SinkError;
pub use registry::{FanoutReport, SinkDelivery, SinkRegistry, SinkStatus};

/// A delivery destination for batches of log entries.
///
/// Implementations receive only entries that already passed the sink's
/// minimum-level filter, and never an empty batch.
#[async_trait]
pub trait LogSink: Send + Sync {
    fn kind(&self) -> SinkKind;

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError>;
}

/// Build the sink described by a configuration entry.
pub fn build_sink(config: &SinkConfig) -> Result<Arc<dyn LogSink>, SinkError> {
    let sink: Arc<dyn LogSink> = match &config.output {
        OutputConfig::Console(c) => Arc::new(console::ConsoleSink::stdout(c.clone())),
        OutputConfig::File(c) => Arc::new(file::FileSink::new(c.clone())),
        OutputConfig::SearchIndex(c) => Arc::new(search_index::SearchIndexSink::new(c.clone())?),
        OutputConfig::Aggregator(c) => Arc::new(aggregator::AggregatorSink::new(c.clone())?),
        OutputConfig::Webhook(c) => Arc::new(webhook::WebhookSink::new(c.clone())?),
    };
    Ok(sink)
}
