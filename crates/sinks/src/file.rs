//! File sink: appends JSON lines or text lines, rotating by size.
//!
//! Rotation shifts `app.log` → `app.log.1` → ... keeping at most
//! `max_files` files including the live one. Age-based pruning is left to
//! the host's log management.

use async_trait::async_trait;
use logstream_core::config::{FileFormat, FileOutput, SinkKind};
use logstream_core::LogEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SinkError;
use crate::format::text_line;
use crate::LogSink;

pub struct FileSink {
    config: FileOutput,
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(config: FileOutput) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    fn render(&self, batch: &[Arc<LogEntry>]) -> Result<String, SinkError> {
        let mut out = String::new();
        for entry in batch {
            match self.config.format {
                FileFormat::Json => out.push_str(&serde_json::to_string(entry.as_ref())?),
                FileFormat::Text => out.push_str(&text_line(entry, false)),
            }
            out.push('\n');
        }
        Ok(out)
    }

    fn archive_path(&self, index: usize) -> PathBuf {
        let mut name = self.config.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    async fn rotate_if_needed(&self, incoming: u64) -> Result<(), SinkError> {
        let current = match fs::metadata(&self.config.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if current == 0 || current + incoming <= self.config.max_size_bytes {
            return Ok(());
        }

        let archives = self.config.max_files.saturating_sub(1);
        if archives == 0 {
            fs::remove_file(&self.config.path).await?;
            return Ok(());
        }

        remove_if_exists(&self.archive_path(archives)).await?;
        for index in (1..archives).rev() {
            rename_if_exists(&self.archive_path(index), &self.archive_path(index + 1)).await?;
        }
        fs::rename(&self.config.path, self.archive_path(1)).await?;
        debug!(path = %self.config.path.display(), size = current, "Rotated log file");
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), SinkError> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

async fn rename_if_exists(from: &Path, to: &Path) -> Result<(), SinkError> {
    match fs::rename(from, to).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl LogSink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        let payload = self.render(batch)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        self.rotate_if_needed(payload.len() as u64).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logstream_core::{EntryMetadata, LogContext, LogLevel};

    fn entry(msg: &str) -> Arc<LogEntry> {
        Arc::new(LogEntry::build(
            Utc::now(),
            LogLevel::Error,
            msg,
            LogContext::from("worker"),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        ))
    }

    fn config(path: PathBuf, format: FileFormat, max_size_bytes: u64) -> FileOutput {
        FileOutput {
            path,
            format,
            max_size_bytes,
            max_files: 3,
        }
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/app.log");
        let sink = FileSink::new(config(path.clone(), FileFormat::Json, 1 << 20));

        sink.write_batch(&[entry("a"), entry("b")]).await.unwrap();
        sink.write_batch(&[entry("c")]).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let messages: Vec<String> = contents
            .lines()
            .map(|l| serde_json::from_str::<LogEntry>(l).unwrap().message)
            .collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_text_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let sink = FileSink::new(config(path.clone(), FileFormat::Text, 1 << 20));

        sink.write_batch(&[entry("job failed")]).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.trim_end().ends_with("[ERROR] [worker] job failed"));
    }

    #[tokio::test]
    async fn test_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let sink = FileSink::new(config(path.clone(), FileFormat::Text, 10));

        sink.write_batch(&[entry("first")]).await.unwrap();
        sink.write_batch(&[entry("second")]).await.unwrap();
        sink.write_batch(&[entry("third")]).await.unwrap();
        sink.write_batch(&[entry("fourth")]).await.unwrap();

        let live = std::fs::read_to_string(&path).unwrap();
        assert!(live.contains("fourth"));
        let one = std::fs::read_to_string(dir.path().join("app.log.1")).unwrap();
        assert!(one.contains("third"));
        let two = std::fs::read_to_string(dir.path().join("app.log.2")).unwrap();
        assert!(two.contains("second"));
        assert!(!dir.path().join("app.log.3").exists());
    }
}
