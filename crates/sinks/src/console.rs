//! Console sink: synchronous line writes to stdout (or any writer).

use async_trait::async_trait;
use logstream_core::config::{ConsoleOutput, SinkKind};
use logstream_core::LogEntry;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

use crate::error::SinkError;
use crate::format::text_line;
use crate::LogSink;

pub struct ConsoleSink {
    config: ConsoleOutput,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stdout(config: ConsoleOutput) -> Self {
        Self::with_writer(config, Box::new(std::io::stdout()))
    }

    pub fn with_writer(config: ConsoleOutput, writer: Box<dyn Write + Send>) -> Self {
        Self {
            config,
            writer: Mutex::new(writer),
        }
    }

    fn render(&self, entry: &LogEntry) -> Result<String, SinkError> {
        if self.config.json {
            Ok(serde_json::to_string(entry)?)
        } else {
            Ok(text_line(entry, self.config.colorize))
        }
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Console
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        let mut out = String::new();
        for entry in batch {
            out.push_str(&self.render(entry)?);
            out.push('\n');
        }
        let mut writer = self.writer.lock();
        writer.write_all(out.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logstream_core::{EntryMetadata, LogContext, LogLevel};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn entry(level: LogLevel, msg: &str) -> Arc<LogEntry> {
        Arc::new(LogEntry::build(
            Utc::now(),
            level,
            msg,
            LogContext::from("api"),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        ))
    }

    #[tokio::test]
    async fn test_text_output() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(
            ConsoleOutput {
                colorize: false,
                json: false,
            },
            Box::new(buf.clone()),
        );
        sink.write_batch(&[entry(LogLevel::Info, "one"), entry(LogLevel::Error, "two")])
            .await
            .unwrap();

        let written = String::from_utf8(buf.0.lock().clone()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO ] [api] one"));
        assert!(lines[1].ends_with("[ERROR] [api] two"));
    }

    #[tokio::test]
    async fn test_json_output() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(
            ConsoleOutput {
                colorize: true,
                json: true,
            },
            Box::new(buf.clone()),
        );
        sink.write_batch(&[entry(LogLevel::Warn, "careful")]).await.unwrap();

        let written = String::from_utf8(buf.0.lock().clone()).unwrap();
        let parsed: LogEntry = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(parsed.message, "careful");
        assert!(!written.contains('\x1b'));
    }
}
