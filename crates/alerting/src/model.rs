use chrono::{DateTime, Duration, Utc};
use logstream_core::filter::contains_any_keyword;
use logstream_core::{saturating_secs, saturating_sub, LogEntry, LogLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// When a rule counts an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// The entry's level must equal this exactly.
    pub level: LogLevel,
    /// Matching entries needed inside the window to fire.
    pub count: u32,
    pub time_window_secs: u64,
    /// Substring match against the entry's service.
    #[serde(default)]
    pub service: Option<String>,
    /// Case-insensitive substring match against the message; any one suffices.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AlertCondition {
    pub fn new(level: LogLevel, count: u32, time_window_secs: u64) -> Self {
        Self {
            level,
            count,
            time_window_secs,
            service: None,
            keywords: Vec::new(),
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn window(&self) -> Duration {
        saturating_secs(self.time_window_secs)
    }

    /// Start of the trailing window ending at `at`.
    pub fn window_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        saturating_sub(at, self.window())
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if entry.level != self.level {
            return false;
        }
        if let Some(service) = &self.service {
            if !entry.service.contains(service.as_str()) {
                return false;
            }
        }
        self.keywords.is_empty() || contains_any_keyword(&entry.message, &self.keywords)
    }
}

/// A notification to send when a rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertAction {
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Email {
        to: Vec<String>,
        #[serde(default)]
        subject: Option<String>,
    },
    Sms {
        to: Vec<String>,
    },
}

impl AlertAction {
    pub fn kind(&self) -> &'static str {
        match self {
            AlertAction::Webhook { .. } => "webhook",
            AlertAction::Email { .. } => "email",
            AlertAction::Sms { .. } => "sms",
        }
    }
}

/// An alert rule as registered with the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAlert {
    pub id: Uuid,
    pub name: String,
    pub condition: AlertCondition,
    pub actions: Vec<AlertAction>,
    pub enabled: bool,
    pub last_triggered: Option<DateTime<Utc>>,
}

/// Rule definition before an id is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub name: String,
    pub condition: AlertCondition,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewAlert {
    pub fn new(name: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            name: name.into(),
            condition,
            actions: Vec::new(),
            enabled: true,
        }
    }

    pub fn action(mut self, action: AlertAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub(crate) fn into_alert(self, id: Uuid) -> LogAlert {
        LogAlert {
            id,
            name: self.name,
            condition: self.condition,
            actions: self.actions,
            enabled: self.enabled,
            last_triggered: None,
        }
    }
}

/// Where a rule sits in its idle → armed → triggered → armed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Disabled; never evaluated.
    Idle,
    /// Enabled and free to fire.
    Armed,
    /// Fired recently; suppressed until the cooldown elapses.
    CoolingDown,
}

impl LogAlert {
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.last_triggered
            .is_some_and(|fired| now.signed_duration_since(fired) < cooldown)
    }

    pub fn status(&self, now: DateTime<Utc>, cooldown: Duration) -> AlertStatus {
        if !self.enabled {
            AlertStatus::Idle
        } else if self.in_cooldown(now, cooldown) {
            AlertStatus::CoolingDown
        } else {
            AlertStatus::Armed
        }
    }
}
