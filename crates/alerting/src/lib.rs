//! Logstream alerting
//!
//! Level-exact, trailing-window threshold rules evaluated against every
//! ingested entry, with a per-rule cooldown and fire-and-forget action
//! dispatch.
//!
//! - [`model`]: rule, condition and action types
//! - [`engine`]: per-rule sliding windows and cooldown bookkeeping
//! - [`notifier`]: webhook / email / SMS delivery
//! - [`dispatcher`]: runs a firing's actions off the ingest path

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod notifier;

pub use dispatcher::AlertDispatcher;
pub use engine::{AlertEngine, AlertFiring};
pub use error::AlertError;
pub use model::{AlertAction, AlertCondition, AlertStatus, LogAlert, NewAlert};
pub use notifier::{AlertNotifier, CaptureNotifier, HttpNotifier};
