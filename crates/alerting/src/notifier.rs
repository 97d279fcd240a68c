//! Alert action delivery.
//!
//! Webhook actions POST the firing to the action's URL. Email and SMS
//! actions POST to the configured gateway, which owns the actual provider
//! integration.

use async_trait::async_trait;
use logstream_core::config::AlertingConfig;
use parking_lot::Mutex;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::engine::AlertFiring;
use crate::error::AlertError;
use crate::model::AlertAction;

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, action: &AlertAction, firing: &AlertFiring) -> Result<(), AlertError>;
}

/// Common JSON body describing a firing.
pub fn firing_payload(firing: &AlertFiring) -> Value {
    json!({
        "alert_id": firing.alert.id,
        "alert_name": firing.alert.name,
        "level": firing.entry.level,
        "service": firing.entry.service,
        "message": firing.entry.message,
        "matched": firing.matched,
        "time_window_secs": firing.alert.condition.time_window_secs,
        "fired_at": firing.fired_at,
        "entry": firing.entry,
    })
}

fn summary(firing: &AlertFiring) -> String {
    format!(
        "[{}] {}: {} {} entries from {} in {}s; latest: {}",
        firing.entry.level.as_str().to_uppercase(),
        firing.alert.name,
        firing.matched,
        firing.entry.level,
        firing.entry.service,
        firing.alert.condition.time_window_secs,
        firing.entry.message
    )
}

pub struct HttpNotifier {
    client: reqwest::Client,
    email_gateway: Option<String>,
    sms_gateway: Option<String>,
}

impl HttpNotifier {
    pub fn new(config: &AlertingConfig) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            email_gateway: config.email_gateway_url.clone(),
            sms_gateway: config.sms_gateway_url.clone(),
        })
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<(), AlertError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(AlertError::Status {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl AlertNotifier for HttpNotifier {
    async fn notify(&self, action: &AlertAction, firing: &AlertFiring) -> Result<(), AlertError> {
        match action {
            AlertAction::Webhook { url, headers } => {
                let mut request = self.client.post(url).json(&firing_payload(firing));
                for (name, value) in headers {
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_str(value),
                    ) {
                        request = request.header(name, value);
                    }
                }
                self.post(request).await
            }
            AlertAction::Email { to, subject } => {
                let gateway = self
                    .email_gateway
                    .as_deref()
                    .ok_or(AlertError::GatewayNotConfigured("email"))?;
                let subject = subject
                    .clone()
                    .unwrap_or_else(|| format!("Alert: {}", firing.alert.name));
                let body = json!({
                    "to": to,
                    "subject": subject,
                    "text": summary(firing),
                    "alert": firing_payload(firing),
                });
                self.post(self.client.post(gateway).json(&body)).await
            }
            AlertAction::Sms { to } => {
                let gateway = self
                    .sms_gateway
                    .as_deref()
                    .ok_or(AlertError::GatewayNotConfigured("sms"))?;
                let body = json!({ "to": to, "message": summary(firing) });
                self.post(self.client.post(gateway).json(&body)).await
            }
        }
    }
}

/// Notifier that records every action it is asked to send, for tests.
#[derive(Default)]
pub struct CaptureNotifier {
    sent: Mutex<Vec<(Uuid, AlertAction)>>,
    failing_kinds: Mutex<Vec<&'static str>>,
}

impl CaptureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every action of this kind (`"webhook"`, `"email"`, `"sms"`) fail.
    pub fn fail_kind(&self, kind: &'static str) {
        self.failing_kinds.lock().push(kind);
    }

    pub fn sent(&self) -> Vec<(Uuid, AlertAction)> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl AlertNotifier for CaptureNotifier {
    async fn notify(&self, action: &AlertAction, firing: &AlertFiring) -> Result<(), AlertError> {
        if self.failing_kinds.lock().contains(&action.kind()) {
            return Err(AlertError::Notifier(format!("{} set to fail", action.kind())));
        }
        debug!(alert_id = %firing.alert.id, action = action.kind(), "Captured alert action");
        self.sent.lock().push((firing.alert.id, action.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AlertEngine;
    use crate::model::{AlertCondition, NewAlert};
    use chrono::{Duration as ChronoDuration, Utc};
    use logstream_core::{EntryMetadata, LogContext, LogEntry, LogLevel};
    use std::collections::HashMap;

    fn firing() -> AlertFiring {
        let engine = AlertEngine::new(ChronoDuration::minutes(5));
        engine.add(
            NewAlert::new("checkout errors", AlertCondition::new(LogLevel::Error, 1, 60)),
            [],
            Utc::now(),
        );
        let entry = LogEntry::build(
            Utc::now(),
            LogLevel::Error,
            "card declined",
            LogContext::from("checkout"),
            EntryMetadata {
                hostname: "h".into(),
                pid: 1,
                version: "0".into(),
            },
        );
        engine.evaluate(&entry).remove(0)
    }

    fn config(email: Option<String>, sms: Option<String>) -> AlertingConfig {
        AlertingConfig {
            email_gateway_url: email,
            sms_gateway_url: sms,
            ..AlertingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_webhook_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_header("x-token", "abc")
            .match_body(mockito::Matcher::PartialJson(json!({
                "alert_name": "checkout errors",
                "service": "checkout",
                "matched": 1,
            })))
            .with_status(202)
            .create_async()
            .await;

        let notifier = HttpNotifier::new(&config(None, None)).unwrap();
        let action = AlertAction::Webhook {
            url: format!("{}/alerts", server.url()),
            headers: HashMap::from([("x-token".to_string(), "abc".to_string())]),
        };
        notifier.notify(&action, &firing()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_email_via_gateway() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/email")
            .match_body(mockito::Matcher::PartialJson(json!({
                "to": ["oncall@example.com"],
                "subject": "Alert: checkout errors",
            })))
            .with_status(200)
            .create_async()
            .await;

        let notifier =
            HttpNotifier::new(&config(Some(format!("{}/email", server.url())), None)).unwrap();
        let action = AlertAction::Email {
            to: vec!["oncall@example.com".into()],
            subject: None,
        };
        notifier.notify(&action, &firing()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sms_without_gateway_fails() {
        let notifier = HttpNotifier::new(&config(None, None)).unwrap();
        let action = AlertAction::Sms {
            to: vec!["+15550100".into()],
        };
        let err = notifier.notify(&action, &firing()).await.unwrap_err();
        assert!(matches!(err, AlertError::GatewayNotConfigured("sms")));
    }
}
