//! Log-aggregator sink speaking the Loki push API.
//!
//! Entries are grouped into streams by `(level, service)` on top of the
//! configured static labels.

use async_trait::async_trait;
use logstream_core::config::{AggregatorOutput, SinkKind};
use logstream_core::LogEntry;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::SinkError;
use crate::http::{build_client, check_status};
use crate::LogSink;

#[derive(Debug, Serialize)]
struct PushRequest {
    streams: Vec<Stream>,
}

#[derive(Debug, Serialize)]
struct Stream {
    stream: BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

pub struct AggregatorSink {
    client: reqwest::Client,
    endpoint: String,
    labels: BTreeMap<String, String>,
    headers: HeaderMap,
}

impl AggregatorSink {
    pub fn new(config: AggregatorOutput) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        if let Some(tenant) = &config.tenant_id {
            if let Ok(value) = HeaderValue::from_str(tenant) {
                headers.insert("x-scope-orgid", value);
            }
        }
        Ok(Self {
            client: build_client(config.timeout_ms)?,
            endpoint: format!("{}/loki/api/v1/push", config.url.trim_end_matches('/')),
            labels: config.labels,
            headers,
        })
    }

    fn push_request(&self, batch: &[Arc<LogEntry>]) -> Result<PushRequest, SinkError> {
        let mut streams: BTreeMap<(String, String), Vec<[String; 2]>> = BTreeMap::new();
        for entry in batch {
            let ts = entry
                .timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| entry.timestamp.timestamp_millis() * 1_000_000);
            let line = serde_json::to_string(entry.as_ref())?;
            streams
                .entry((entry.level.as_str().to_string(), entry.service.clone()))
                .or_default()
                .push([ts.to_string(), line]);
        }

        let streams = streams
            .into_iter()
            .map(|((level, service), values)| {
                let mut stream = self.labels.clone();
                stream.insert("level".into(), level);
                stream.insert("service".into(), service);
                Stream { stream, values }
            })
            .collect();
        Ok(PushRequest { streams })
    }
}

#[async_trait]
impl LogSink for AggregatorSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Aggregator
    }

    async fn write_batch(&self, batch: &[Arc<LogEntry>]) -> Result<(), SinkError> {
        let request = self.push_request(batch)?;
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;
        check_status(resp).await?;
        debug!(count = batch.len(), streams = request.streams.len(), "Pushed log batch");
        Ok(())
    }
}
