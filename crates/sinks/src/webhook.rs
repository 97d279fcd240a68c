//! Webhook sink: one JSON POST per batch.

use async_trait::async_trait;
use chrono::Utc;
use logstream_core::config::{SinkKind, WebhookOutput};
use logstream_core::LogEntry;
use reqwest::header::HeaderMap;
use serde_json::json;
use std::sync::Arc;

use crate::error::SinkError;
use crate::http::{build_client, check_status, header_map};
use crate::LogSink;

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl WebhookSink {
    pub fn new(config: WebhookOutput) -> Result<Self, SinkError> {
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            headers: header_map(&config.headers),
            url: config.url,
        })
    }
}

#[async_trait]
impl LogSink for WebhookSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Webhook
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        let entries: Vec<&LogEntry> = batch.iter().map(Arc::as_ref).collect();
        let payload = json!({
            "source": "logstream",
            "sent_at": Utc::now(),
            "count": entries.len(),
            "entries": entries,
        });
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&payload)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
