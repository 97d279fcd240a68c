//! Logstream pipeline
//!
//! The ingestion API and everything behind it: the bounded buffer, the
//! running metrics, the flush scheduler and the [`Logger`] context that
//! ties sinks, alerting and analytics together.

pub mod buffer;
pub mod error;
pub mod logger;
pub mod metrics;

pub use buffer::LogBuffer;
pub use error::PipelineError;
pub use logger::Logger;
pub use metrics::{LogMetrics, MetricsRecorder, PerformanceMetrics};
