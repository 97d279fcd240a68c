//! Fire-and-forget execution of alert actions.
//!
//! Each firing runs on its own task; its actions run in order and a failing
//! action never stops the ones after it.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{error, warn};

use crate::engine::AlertFiring;
use crate::error::AlertError;
use crate::notifier::AlertNotifier;

/// Runs alert actions on a runtime captured when the dispatcher was built
/// (or bound later), so firings raised from plain threads still go out.
pub struct AlertDispatcher {
    notifier: Arc<dyn AlertNotifier>,
    runtime: RwLock<Option<Handle>>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn AlertNotifier>) -> Self {
        Self {
            notifier,
            runtime: RwLock::new(Handle::try_current().ok()),
        }
    }

    /// Use `handle` for dispatch if no runtime was captured yet.
    pub fn bind(&self, handle: Handle) {
        let mut runtime = self.runtime.write();
        if runtime.is_none() {
            *runtime = Some(handle);
        }
    }

    pub fn has_runtime(&self) -> bool {
        self.runtime.read().is_some()
    }

    /// Spawn the firing's actions on the captured runtime.
    ///
    /// Returns false, after logging a warning, if there is no runtime to run
    /// them on.
    pub fn dispatch(&self, firing: AlertFiring) -> bool {
        if firing.alert.actions.is_empty() {
            return true;
        }
        let runtime = self.runtime.read().clone();
        match runtime {
            Some(handle) => {
                let notifier = self.notifier.clone();
                handle.spawn(async move {
                    run_actions(notifier.as_ref(), &firing).await;
                });
                true
            }
            None => {
                warn!(
                    alert_id = %firing.alert.id,
                    "No async runtime available, alert actions dropped"
                );
                false
            }
        }
    }
}

/// Run every action of a firing in order, returning each outcome.
pub async fn run_actions(
    notifier: &dyn AlertNotifier,
    firing: &AlertFiring,
) -> Vec<Result<(), AlertError>> {
    let mut outcomes = Vec::with_capacity(firing.alert.actions.len());
    for action in &firing.alert.actions {
        let outcome = notifier.notify(action, firing).await;
        if let Err(e) = &outcome {
            error!(
                alert_id = %firing.alert.id,
                action = action.kind(),
                error = %e,
                "Alert action failed"
            );
        }
        outcomes.push(outcome);
    }
    outcomes
}
