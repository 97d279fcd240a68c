//! Wall-clock abstraction.
//!
//! Cooldowns, trailing windows and analytics all read "now" through
//! [`Clock`], so tests can drive time with [`ManualClock`] instead of sleeping.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    /// Current wall-clock time, truncated to millisecond precision.
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start.trunc_subsecs(3)),
        }
    }

    /// A clock starting at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.current.lock() = to.trunc_subsecs(3);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// `secs` as a duration, saturating at the longest representable span.
pub fn saturating_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// `at - span`, saturating at the earliest representable instant.
pub fn saturating_sub(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
