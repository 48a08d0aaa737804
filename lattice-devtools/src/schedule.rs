//! Trailing-edge throttles.
//!
//! Time is passed in explicitly, so the debugger can be driven by a real
//! clock or stepped deterministically in tests.

use std::time::{Duration, Instant};

/// Runs work at most once per interval.
///
/// The first trigger opens a window; the work is due `interval` later. Further
/// triggers inside the window are absorbed.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    due_at: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            due_at: None,
        }
    }

    /// Request a run. Returns the instant the run is due.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        *self.due_at.get_or_insert(now + self.interval)
    }

    /// Request a run at `now`, skipping the window.
    pub fn trigger_now(&mut self, now: Instant) {
        self.due_at = Some(self.due_at.map_or(now, |due| due.min(now)));
    }

    /// Whether a run is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at.is_some_and(|due| now >= due)
    }

    /// Consume a due run. Returns `false` if nothing is due yet.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.due_at = None;
            true
        } else {
            false
        }
    }

    /// Drop a pending run.
    pub fn cancel(&mut self) {
        self.due_at = None;
    }

    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_trigger_opens_the_window() {
        let start = Instant::now();
        let mut throttle = Throttle::new(MS * 100);

        assert_eq!(throttle.trigger(start), start + MS * 100);
        assert_eq!(throttle.trigger(start + MS * 50), start + MS * 100);

        assert!(!throttle.take_due(start + MS * 99));
        assert!(throttle.take_due(start + MS * 100));
        assert!(!throttle.is_pending());
    }

    #[test]
    fn cancel_drops_the_pending_run() {
        let start = Instant::now();
        let mut throttle = Throttle::new(MS * 10);
        throttle.trigger(start);
        throttle.cancel();
        assert!(!throttle.is_due(start + MS * 20));
    }

    #[test]
    fn trigger_now_skips_the_window() {
        let start = Instant::now();
        let mut throttle = Throttle::new(MS * 250);
        throttle.trigger(start);
        throttle.trigger_now(start + MS);
        assert!(throttle.is_due(start + MS));
    }
}
