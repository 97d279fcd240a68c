//! Alert rule engine.
//!
//! Each rule keeps a deque of the timestamps of its most recent matching
//! entries, capped at the rule's threshold and pruned to its trailing
//! window. Evaluating an entry is therefore O(rules), independent of how
//! many entries are buffered.

use chrono::{DateTime, Duration, Utc};
use logstream_core::LogEntry;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{LogAlert, NewAlert};

struct RuleState {
    alert: LogAlert,
    hits: VecDeque<DateTime<Utc>>,
}

impl RuleState {
    fn new(alert: LogAlert) -> Self {
        Self {
            alert,
            hits: VecDeque::new(),
        }
    }

    /// Record a matching entry and return how many matches fall inside the
    /// trailing window ending at `at`.
    fn record(&mut self, at: DateTime<Utc>) -> usize {
        let threshold = self.alert.condition.count.max(1) as usize;
        self.hits.push_back(at);
        while self.hits.len() > threshold {
            self.hits.pop_front();
        }
        let window_start = self.alert.condition.window_start(at);
        while self.hits.front().is_some_and(|t| *t < window_start) {
            self.hits.pop_front();
        }
        self.hits.len()
    }
}

/// A rule that crossed its threshold outside its cooldown.
#[derive(Debug, Clone, Serialize)]
pub struct AlertFiring {
    /// The rule as it stands after firing (with `last_triggered` stamped).
    pub alert: LogAlert,
    /// The entry that crossed the threshold.
    pub entry: LogEntry,
    /// Matching entries inside the window, including `entry`.
    pub matched: usize,
    pub fired_at: DateTime<Utc>,
}

pub struct AlertEngine {
    rules: RwLock<Vec<RuleState>>,
    cooldown: Duration,
}

impl AlertEngine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Register a rule and seed its window from entries already retained.
    ///
    /// `retained` must be in timestamp order.
    pub fn add<'a>(
        &self,
        alert: NewAlert,
        retained: impl IntoIterator<Item = &'a LogEntry>,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut state = RuleState::new(alert.into_alert(id));

        let window_start = state.alert.condition.window_start(now);
        for entry in retained {
            if entry.timestamp >= window_start && state.alert.condition.matches(entry) {
                state.record(entry.timestamp);
            }
        }

        info!(alert_id = %id, name = %state.alert.name, "Alert rule added");
        self.rules.write().push(state);
        id
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.alert.id != *id);
        let removed = rules.len() != before;
        if removed {
            info!(alert_id = %id, "Alert rule removed");
        }
        removed
    }

    pub fn set_enabled(&self, id: &Uuid, enabled: bool) -> bool {
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| r.alert.id == *id) {
            Some(rule) => {
                rule.alert.enabled = enabled;
                if !enabled {
                    rule.hits.clear();
                }
                true
            }
            None => false,
        }
    }

    /// Snapshot of all rules in registration order.
    pub fn alerts(&self) -> Vec<LogAlert> {
        self.rules.read().iter().map(|r| r.alert.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Forget matches older than `cutoff`, mirroring a buffer cleanup.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut rules = self.rules.write();
        let mut pruned = 0;
        for rule in rules.iter_mut() {
            while rule.hits.front().is_some_and(|t| *t < cutoff) {
                rule.hits.pop_front();
                pruned += 1;
            }
        }
        pruned
    }

    /// Evaluate one freshly ingested entry against every enabled rule.
    ///
    /// Window and cooldown arithmetic use the entry's own timestamp as "now".
    pub fn evaluate(&self, entry: &LogEntry) -> Vec<AlertFiring> {
        self.evaluate_with(entry, true)
    }

    /// Like [`AlertEngine::evaluate`], but when `can_dispatch` is false a
    /// rule with actions that crosses its threshold is left armed instead of
    /// firing, so its cooldown is not spent on notifications nobody sends.
    pub fn evaluate_with(&self, entry: &LogEntry, can_dispatch: bool) -> Vec<AlertFiring> {
        let now = entry.timestamp;
        let mut firings = Vec::new();
        let mut rules = self.rules.write();

        for rule in rules.iter_mut() {
            if !rule.alert.enabled || !rule.alert.condition.matches(entry) {
                continue;
            }
            let matched = rule.record(now);
            if matched < rule.alert.condition.count as usize {
                continue;
            }
            if rule.alert.in_cooldown(now, self.cooldown) {
                continue;
            }
            if !can_dispatch && !rule.alert.actions.is_empty() {
                warn!(
                    alert_id = %rule.alert.id,
                    name = %rule.alert.name,
                    "Alert threshold crossed but no runtime is available for its actions"
                );
                continue;
            }

            rule.alert.last_triggered = Some(now);
            metrics::counter!("logstream.alerts.fired").increment(1);
            warn!(
                alert_id = %rule.alert.id,
                name = %rule.alert.name,
                matched = matched,
                service = %entry.service,
                "Alert triggered"
            );
            firings.push(AlertFiring {
                alert: rule.alert.clone(),
                entry: entry.clone(),
                matched,
                fired_at: now,
            });
        }
        firings
    }
}
