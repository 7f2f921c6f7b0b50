//! Per-source trigger rate limiting for the scheduler's trigger scan.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Tracks when each source last fired and gates re-triggering until its
/// interval has elapsed. Purely in-memory: a restart re-arms every
/// source, which at worst triggers one early run.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_fired: HashMap<i64, DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the source may fire now; firing records the timestamp.
    pub fn try_fire(&mut self, source_id: i64, interval_seconds: i64) -> bool {
        self.try_fire_at(source_id, interval_seconds, Utc::now())
    }

    fn try_fire_at(&mut self, source_id: i64, interval_seconds: i64, now: DateTime<Utc>) -> bool {
        let due = match self.last_fired.get(&source_id) {
            Some(last) => now - *last >= Duration::seconds(interval_seconds),
            None => true,
        };
        if due {
            self.last_fired.insert(source_id, now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_always_fires() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.try_fire(1, 300));
    }

    #[test]
    fn refires_only_after_interval() {
        let mut limiter = RateLimiter::new();
        let t0 = Utc::now();
        assert!(limiter.try_fire_at(1, 60, t0));
        assert!(!limiter.try_fire_at(1, 60, t0 + Duration::seconds(59)));
        assert!(limiter.try_fire_at(1, 60, t0 + Duration::seconds(60)));
    }

    #[test]
    fn sources_are_tracked_independently() {
        let mut limiter = RateLimiter::new();
        let t0 = Utc::now();
        assert!(limiter.try_fire_at(1, 60, t0));
        assert!(limiter.try_fire_at(2, 60, t0));
        assert!(!limiter.try_fire_at(1, 60, t0 + Duration::seconds(1)));
    }

    #[test]
    fn denied_attempt_does_not_reset_the_clock() {
        let mut limiter = RateLimiter::new();
        let t0 = Utc::now();
        assert!(limiter.try_fire_at(1, 60, t0));
        assert!(!limiter.try_fire_at(1, 60, t0 + Duration::seconds(30)));
        // Still due at t0+60 even after the denied attempt.
        assert!(limiter.try_fire_at(1, 60, t0 + Duration::seconds(60)));
    }
}
