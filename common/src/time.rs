//! Clocks and timing constants for rate resolution.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Timing and fallback constants.
pub mod constants {
    use super::Duration;

    /// How long a resolved rate stays fresh (24 hours).
    pub const RATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Default bound on a single provider attempt (4 seconds).
    pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(4000);

    /// PEN per USD used when every live provider is unavailable.
    pub const DEFAULT_FIXED_PEN_PER_USD: f64 = 3.5;
}

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Current time as epoch milliseconds.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Saturating conversion of a duration to whole milliseconds.
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
