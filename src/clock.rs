//! Time abstraction for testability.
//!
//! All components read the current time through the [`Clock`] trait so that
//! registration deadlines and refund cutoffs can be tested deterministically.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed, settable clock for deterministic tests.
///
/// Always returns the time it was last set to, making deadline and cutoff
/// checks reproducible.
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a fixed clock at the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Moves the clock to a new time.
    pub fn set(&self, time: DateTime<Utc>) {
        *self
            .time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = time;
    }

    /// Advances the clock by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self
            .time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
