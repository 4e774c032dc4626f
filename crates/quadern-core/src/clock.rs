//! Time sources for timestamps and id generation.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::wire::truncate_millis;

/// Source of the current time, at millisecond precision.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        truncate_millis(Utc::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: Mutex::new(truncate_millis(at)),
        }
    }

    /// Clock frozen at a Unix timestamp in milliseconds.
    pub fn at_millis(millis: i64) -> Self {
        let at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();
        Self::new(at)
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap_or_else(|e| e.into_inner()) = truncate_millis(at);
    }

    pub fn advance(&self, by: Duration) {
        let mut at = self.at.lock().unwrap_or_else(|e| e.into_inner());
        *at += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_on_demand() {
        let clock = FixedClock::at_millis(1_700_000_000_000);
        assert_eq!(clock.now().timestamp_millis(), 1_700_000_000_000);
        clock.advance(Duration::milliseconds(5));
        assert_eq!(clock.now().timestamp_millis(), 1_700_000_000_005);
        clock.set(Utc.timestamp_millis_opt(42).unwrap());
        assert_eq!(clock.now().timestamp_millis(), 42);
    }

    #[test]
    fn system_clock_has_millisecond_precision() {
        assert_eq!(SystemClock.now().timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
