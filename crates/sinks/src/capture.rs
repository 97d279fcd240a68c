//! In-memory sink that records delivered batches, for tests.

use async_trait::async_trait;
use logstream_core::config::SinkKind;
use logstream_core::LogEntry;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SinkError;
use crate::LogSink;

pub struct CaptureSink {
    kind: SinkKind,
    batches: Mutex<Vec<Vec<Arc<LogEntry>>>>,
    failing: AtomicBool,
}

impl CaptureSink {
    pub fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            batches: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail with an IO error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<Arc<LogEntry>>> {
        self.batches.lock().clone()
    }

    pub fn entries(&self) -> Vec<Arc<LogEntry>> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.batches.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl LogSink for CaptureSink {
    fn kind(&self) -> SinkKind {
        self.kind
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "capture sink set to fail",
            )));
        }
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}
