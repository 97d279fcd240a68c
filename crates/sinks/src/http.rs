use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::error::SinkError;

pub(crate) fn build_client(timeout_ms: u64) -> Result<reqwest::Client, SinkError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?)
}

/// Convert configured headers, skipping names or values HTTP would reject.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid sink header"),
        }
    }
    map
}

/// Map a non-success response into [`SinkError::Status`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body,
    })
}
