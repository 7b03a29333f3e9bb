//! Fixed-interval reconnect bookkeeping.
//!
//! The controller holds no timers. The connection task asks it for the next
//! delay after an unexpected close, sleeps, and retries. The attempt counter
//! is reset only once a socket actually opens, so a manual `connect()` after
//! the budget is exhausted gets exactly one more try before giving up again.

use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct ReconnectController {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectController {
    pub(crate) fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            attempts: 0,
        }
    }

    /// Reserve the next attempt. Returns the delay to wait before it, or
    /// `None` once `max_attempts` have been used.
    pub(crate) fn schedule(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.interval)
    }

    /// Called after a successful open.
    pub(crate) fn reset(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedules_exactly_max_attempts() {
        let mut rc = ReconnectController::new(Duration::from_millis(50), 3);
        for expected in 1..=3 {
            assert_eq!(rc.schedule(), Some(Duration::from_millis(50)));
            assert_eq!(rc.attempts(), expected);
        }
        assert_eq!(rc.schedule(), None, "no fourth attempt");
        assert!(rc.is_exhausted());
        assert_eq!(rc.attempts(), 3, "counter does not grow past the cap");
    }

    #[test]
    fn test_interval_is_fixed() {
        let mut rc = ReconnectController::new(Duration::from_secs(5), 10);
        let delays: Vec<_> = std::iter::from_fn(|| rc.schedule()).collect();
        assert_eq!(delays.len(), 10);
        assert!(delays.iter().all(|d| *d == Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut rc = ReconnectController::new(Duration::from_millis(10), 2);
        rc.schedule();
        rc.schedule();
        assert!(rc.is_exhausted());

        rc.reset();
        assert_eq!(rc.attempts(), 0);
        assert!(rc.schedule().is_some());
        assert!(rc.schedule().is_some());
        assert!(rc.schedule().is_none());
    }

    #[test]
    fn test_zero_budget_never_schedules() {
        let mut rc = ReconnectController::new(Duration::from_millis(10), 0);
        assert_eq!(rc.max_attempts(), 0);
        assert!(rc.schedule().is_none());
    }
}
