//! Suppression of readings arriving faster than the reporting interval.
//!
//! The inverter answers far more often than its measurements meaningfully
//! change, so the decode path drops anything closer than a minimum interval
//! to the previously logged reading before it ever reaches persistence.

use chrono::{DateTime, Duration, Utc};

/// Emits at most one reading per minimum interval.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_emitted: Option<DateTime<Utc>>,
}

impl Default for RateLimiter {
    /// Five seconds between logged readings.
    fn default() -> Self {
        Self::new(Duration::seconds(5))
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emitted: None,
        }
    }

    /// Decide whether a reading sampled at `at` should be emitted.
    ///
    /// True iff nothing has been emitted yet or at least the minimum
    /// interval has passed since the last *emitted* reading; suppressed
    /// readings do not reset the clock. On true the emission time is
    /// recorded.
    pub fn permit(&mut self, at: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_emitted {
            if at - last < self.min_interval {
                return false;
            }
        }
        self.last_emitted = Some(at);
        true
    }
}
