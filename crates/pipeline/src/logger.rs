//! The logger context object.
//!
//! A [`Logger`] owns the buffer, running metrics, sink registry and alert
//! engine for one pipeline. It is constructed once by the host and cloned
//! into every call site that logs; tests build independent instances.
//!
//! Ingestion is synchronous and does no I/O. Sink delivery happens on the
//! flush scheduler (or an explicit [`Logger::flush`]) and alert actions run
//! on spawned tasks.

use chrono::Duration as ChronoDuration;
use logstream_alerting::{
    AlertDispatcher, AlertEngine, AlertNotifier, AlertStatus, HttpNotifier, LogAlert, NewAlert,
};
use logstream_analytics::{
    compute_analytics, export_logs, query_logs, ExportError, ExportFormat, LogAnalytics,
};
use logstream_core::config::SinkKind;
use logstream_core::{
    saturating_secs, saturating_sub, AppConfig, Clock, EntryMetadata, LogContext, LogEntry,
    LogFilter, LogLevel, SystemClock,
};
use logstream_sinks::{FanoutReport, SinkRegistry, SinkStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::LogBuffer;
use crate::error::PipelineError;
use crate::metrics::{LogMetrics, MetricsRecorder};

struct Inner {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    metadata: EntryMetadata,
    buffer: Mutex<LogBuffer>,
    recorder: Mutex<MetricsRecorder>,
    sinks: SinkRegistry,
    alerts: AlertEngine,
    dispatcher: AlertDispatcher,
    flushing: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
}

struct Scheduler {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Releases the in-flight flag however the flush ends.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    /// Build a logger with the configured sinks, the HTTP alert notifier and
    /// the system clock. The flush scheduler is not started.
    pub fn new(config: AppConfig) -> Result<Self, PipelineError> {
        let sinks = SinkRegistry::from_configs(&config.effective_sinks())?;
        if sinks.is_empty() {
            warn!("No sinks configured, entries will only be kept in memory");
        }
        let notifier = Arc::new(HttpNotifier::new(&config.alerting)?);
        Ok(Self::with_parts(config, Arc::new(SystemClock), sinks, notifier))
    }

    /// Assemble a logger from explicit parts. Alert actions run on the tokio
    /// runtime current at this call, or on the one [`Logger::start`] runs on.
    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        sinks: SinkRegistry,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        let cooldown = saturating_secs(config.alerting.cooldown_secs);
        let inner = Inner {
            metadata: EntryMetadata::current(config.version.clone()),
            buffer: Mutex::new(LogBuffer::new(&config.buffer)),
            recorder: Mutex::new(MetricsRecorder::new(&config.metrics)),
            alerts: AlertEngine::new(cooldown),
            dispatcher: AlertDispatcher::new(notifier),
            flushing: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            clock,
            sinks,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    // ─── Ingestion ──────────────────────────────────────────────────────

    /// Record one entry: buffer it, update the running metrics and evaluate
    /// every enabled alert rule. Never fails and never blocks on I/O.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: impl Into<LogContext>,
    ) {
        let inner = &self.inner;
        let entry = Arc::new(LogEntry::build(
            inner.clock.now(),
            level,
            message,
            context.into(),
            inner.metadata.clone(),
        ));

        let discarded = inner.buffer.lock().push(entry.clone());
        if discarded > 0 {
            ::metrics::counter!("logstream.dropped").increment(discarded as u64);
            warn!(
                discarded = discarded,
                "Log buffer overflow, oldest pending entries discarded"
            );
        }
        inner.recorder.lock().record(&entry);
        ::metrics::counter!("logstream.ingested", "level" => level.as_str()).increment(1);

        let can_dispatch = inner.dispatcher.has_runtime();
        for firing in inner.alerts.evaluate_with(&entry, can_dispatch) {
            inner.dispatcher.dispatch(firing);
        }
    }

    pub fn debug(&self, message: impl Into<String>, context: impl Into<LogContext>) {
        self.log(LogLevel::Debug, message, context);
    }

    pub fn info(&self, message: impl Into<String>, context: impl Into<LogContext>) {
        self.log(LogLevel::Info, message, context);
    }

    pub fn warn(&self, message: impl Into<String>, context: impl Into<LogContext>) {
        self.log(LogLevel::Warn, message, context);
    }

    pub fn error(&self, message: impl Into<String>, context: impl Into<LogContext>) {
        self.log(LogLevel::Error, message, context);
    }

    pub fn fatal(&self, message: impl Into<String>, context: impl Into<LogContext>) {
        self.log(LogLevel::Fatal, message, context);
    }

    // ─── Flushing ───────────────────────────────────────────────────────

    /// Start the periodic flush on the current tokio runtime. Calling it
    /// while the scheduler is already running does nothing.
    pub fn start(&self) -> Result<(), PipelineError> {
        let handle = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.is_some() {
            return Ok(());
        }

        self.inner.dispatcher.bind(handle.clone());
        let period = Duration::from_millis(self.inner.config.flush.interval_ms.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(&self.inner);
        let task = handle.spawn(run_scheduler(weak, period, stop_rx));

        info!(interval_ms = period.as_millis() as u64, "Flush scheduler started");
        *scheduler = Some(Scheduler {
            stop_tx,
            handle: task,
        });
        Ok(())
    }

    /// Deliver the pending batch now.
    ///
    /// Returns `None` without doing anything if another flush is in flight.
    pub async fn flush(&self) -> Option<FanoutReport> {
        self.inner.flush().await
    }

    /// Halt the periodic scheduler. A flush already running completes.
    pub fn stop(&self) {
        if let Some(scheduler) = self.inner.scheduler.lock().take() {
            let _ = scheduler.stop_tx.send(true);
            info!("Flush scheduler stopped");
        }
    }

    /// Stop the scheduler, wait for it to exit, then deliver whatever is
    /// still pending.
    pub async fn shutdown(&self) -> FanoutReport {
        let scheduler = self.inner.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            let _ = scheduler.stop_tx.send(true);
            if let Err(e) = scheduler.handle.await {
                warn!(error = %e, "Flush scheduler exited abnormally");
            }
            info!("Flush scheduler stopped");
        }

        loop {
            if let Some(report) = self.inner.flush().await {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    // ─── Query & management ─────────────────────────────────────────────

    pub fn query_logs(&self, filter: &LogFilter, limit: usize) -> Vec<LogEntry> {
        let buffer = self.inner.buffer.lock();
        query_logs(buffer.iter(), filter, limit)
    }

    /// Matching entries serialized as JSON or CSV, newest first, capped at the
    /// buffer capacity.
    pub fn export_logs(
        &self,
        filter: &LogFilter,
        format: ExportFormat,
    ) -> Result<String, ExportError> {
        let entries = self.query_logs(filter, self.inner.config.buffer.capacity);
        export_logs(&entries, format)
    }

    pub fn metrics(&self) -> LogMetrics {
        let (buffer_size, dropped) = {
            let buffer = self.inner.buffer.lock();
            (buffer.len(), buffer.dropped())
        };
        self.inner.recorder.lock().snapshot(buffer_size, dropped)
    }

    pub fn analytics(&self) -> LogAnalytics {
        let now = self.inner.clock.now();
        let buffer = self.inner.buffer.lock();
        compute_analytics(buffer.iter(), now, &self.inner.config.analytics)
    }

    /// Register an alert rule. Its window is seeded from retained entries.
    pub fn add_alert(&self, alert: NewAlert) -> Uuid {
        let now = self.inner.clock.now();
        let buffer = self.inner.buffer.lock();
        self.inner.alerts.add(alert, buffer.iter(), now)
    }

    pub fn remove_alert(&self, id: &Uuid) -> bool {
        self.inner.alerts.remove(id)
    }

    pub fn set_alert_enabled(&self, id: &Uuid, enabled: bool) -> bool {
        self.inner.alerts.set_enabled(id, enabled)
    }

    pub fn alerts(&self) -> Vec<LogAlert> {
        self.inner.alerts.alerts()
    }

    /// Every rule with where it currently sits in its idle/armed/cooling
    /// cycle.
    pub fn alert_statuses(&self) -> Vec<(LogAlert, AlertStatus)> {
        let now = self.inner.clock.now();
        let cooldown = self.inner.alerts.cooldown();
        self.inner
            .alerts
            .alerts()
            .into_iter()
            .map(|alert| {
                let status = alert.status(now, cooldown);
                (alert, status)
            })
            .collect()
    }

    /// Evict retained entries, recent errors and alert-window matches older
    /// than `max_age`. Returns how many buffered entries were removed.
    pub fn cleanup(&self, max_age: ChronoDuration) -> usize {
        let cutoff = saturating_sub(self.inner.clock.now(), max_age);
        let removed = self.inner.buffer.lock().cleanup(cutoff);
        let errors = self.inner.recorder.lock().cleanup(cutoff);
        let matches = self.inner.alerts.prune_before(cutoff);
        debug!(
            removed = removed,
            recent_errors = errors,
            alert_matches = matches,
            "Cleaned up old entries"
        );
        removed
    }

    pub fn set_sink_enabled(&self, kind: SinkKind, enabled: bool) -> usize {
        let changed = self.inner.sinks.set_enabled(kind, enabled);
        info!(sink = %kind, enabled = enabled, changed = changed, "Sink toggled");
        changed
    }

    pub fn sinks(&self) -> Vec<SinkStatus> {
        self.inner.sinks.statuses()
    }
}

impl Inner {
    async fn flush(&self) -> Option<FanoutReport> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Flush already in flight, skipping");
            return None;
        }
        let _guard = FlushGuard(&self.flushing);

        let batch = self.buffer.lock().take_pending();
        if batch.is_empty() {
            return Some(FanoutReport::default());
        }

        let started = Instant::now();
        let report = self.sinks.fanout(&batch).await;
        let elapsed = started.elapsed();
        self.recorder.lock().record_flush(batch.len(), elapsed);

        debug!(
            count = batch.len(),
            delivered = report.delivered(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Flushed log batch"
        );
        Some(report)
    }
}

async fn run_scheduler(inner: Weak<Inner>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.flush().await;
            }
            _ = stop_rx.changed() => break,
        }
    }
}
