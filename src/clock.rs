//! Clock abstraction so message timestamps are testable.

use chrono::Utc;

/// Source of "now" in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a given instant (tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_millis: i64,
}

impl FixedClock {
    pub fn new(fixed_millis: i64) -> Self {
        Self { fixed_millis }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_fixed_clock_does_not_move() {
        let clock = FixedClock::new(1_700_000_000_123);
        assert_eq!(clock.now_millis(), 1_700_000_000_123);
        assert_eq!(clock.now_millis(), 1_700_000_000_123);
    }
}
