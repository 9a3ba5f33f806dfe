//! Fixed-period ticker.

use std::time::{Duration, Instant};

/// Fires at most once per `period`, measured on whatever clock the caller
/// samples `now` from.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    last: Instant,
}

impl Ticker {
    /// Create a ticker whose first tick is due one period after `now`.
    #[must_use]
    pub fn new(period: Duration, now: Instant) -> Self {
        Self { period, last: now }
    }

    /// Returns `true` (and restarts the period) if a full period has elapsed
    /// since the last tick.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.period {
            self.last = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_period() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(5), start);

        assert!(!ticker.poll(start));
        assert!(!ticker.poll(start + Duration::from_secs(4)));
        assert!(ticker.poll(start + Duration::from_secs(5)));
        assert!(!ticker.poll(start + Duration::from_secs(6)));
        assert!(ticker.poll(start + Duration::from_secs(12)));
    }

    #[test]
    fn test_zero_period_always_fires() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::ZERO, start);
        assert!(ticker.poll(start));
        assert!(ticker.poll(start));
    }
}
