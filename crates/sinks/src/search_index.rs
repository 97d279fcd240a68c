//! Search-index sink speaking the Elasticsearch `_bulk` protocol.

use async_trait::async_trait;
use logstream_core::config::{SearchIndexOutput, SinkKind};
use logstream_core::LogEntry;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::error::SinkError;
use crate::http::{build_client, check_status, header_map};
use crate::LogSink;

pub struct SearchIndexSink {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    headers: HeaderMap,
}

impl SearchIndexSink {
    pub fn new(config: SearchIndexOutput) -> Result<Self, SinkError> {
        let mut headers = header_map(&config.headers);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
        if let Some(key) = &config.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("ApiKey {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            endpoint: format!("{}/_bulk", config.url.trim_end_matches('/')),
            index: config.index,
            headers,
        })
    }

    fn bulk_body(&self, batch: &[Arc<LogEntry>]) -> Result<String, SinkError> {
        let action = serde_json::to_string(&json!({ "index": { "_index": self.index } }))?;
        let mut body = String::new();
        for entry in batch {
            body.push_str(&action);
            body.push('\n');
            body.push_str(&serde_json::to_string(entry.as_ref())?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl LogSink for SearchIndexSink {
    fn kind(&self) -> SinkKind {
        SinkKind::SearchIndex
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        let body = self.bulk_body(batch)?;
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        // The bulk API answers 200 even when individual documents fail.
        let summary: serde_json::Value = resp.json().await?;
        if summary.get("errors").and_then(|v| v.as_bool()) == Some(true) {
            let rejected = summary
                .get("items")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| item.pointer("/index/error").is_some())
                        .count()
                })
                .unwrap_or(batch.len());
            return Err(SinkError::Rejected {
                rejected,
                total: batch.len(),
            });
        }

        debug!(count = batch.len(), index = %self.index, "Bulk indexed log batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logstream_core::{EntryMetadata, LogContext, LogLevel};
    use std::collections::HashMap;

    fn entry(msg: &str) -> Arc<LogEntry> {
        Arc::new(LogEntry::build(
            Utc::now(),
            LogLevel::Info,
            msg,
            LogContext::from("api"),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        ))
    }

    fn config(url: String) -> SearchIndexOutput {
        SearchIndexOutput {
            url,
            index: "app-logs".into(),
            api_key: Some("secret".into()),
            headers: HashMap::new(),
            timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn test_bulk_submission() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_bulk")
            .match_header("authorization", "ApiKey secret")
            .match_header("content-type", "application/x-ndjson")
            .match_body(mockito::Matcher::Regex(r#"\{"index":\{"_index":"app-logs"\}\}"#.into()))
            .with_status(200)
            .with_body(r#"{"errors":false,"items":[]}"#)
            .create_async()
            .await;

        let sink = SearchIndexSink::new(config(server.url())).unwrap();
        sink.write_batch(&[entry("a"), entry("b")]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_partial_rejection_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/_bulk")
            .with_status(200)
            .with_body(
                r#"{"errors":true,"items":[{"index":{"status":201}},{"index":{"status":400,"error":{"type":"mapper_parsing_exception"}}}]}"#,
            )
            .create_async()
            .await;

        let sink = SearchIndexSink::new(config(server.url())).unwrap();
        let err = sink.write_batch(&[entry("a"), entry("b")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected { rejected: 1, total: 2 }));
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/_bulk")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let sink = SearchIndexSink::new(config(server.url())).unwrap();
        let err = sink.write_batch(&[entry("a")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Status { status: 503, .. }));
    }
}
