//! Rate limiting for rapid advance requests.
//!
//! The throttle is advisory: a swallowed request is simply not served, and
//! the caller's own input loop decides whether to retry.

use std::time::{Duration, Instant};

/// Outcome of [`Replayer::try_advance`](crate::Replayer::try_advance).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// Too soon after the last served request; ignore this input event.
    Swallowed,
    /// The request was served. Carries whether the position changed.
    Stepped(bool),
}

/// Monotonic-clock gate with a minimum spacing between admitted requests.
#[derive(Clone, Debug)]
pub struct Throttle {
    interval: Duration,
    last_served: Option<Instant>,
}

impl Throttle {
    /// A throttle admitting at most one request per `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_served: None,
        }
    }

    /// Admit or swallow a request made at `now`.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_served {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_served = Some(now);
        true
    }

    /// Forget the last served request.
    pub fn reset(&mut self) {
        self.last_served = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_inside_the_interval_are_swallowed() {
        let mut throttle = Throttle::new(Duration::from_millis(20));
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(t0 + Duration::from_millis(5)));
        assert!(!throttle.admit(t0 + Duration::from_millis(19)));
        assert!(throttle.admit(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn swallowed_requests_do_not_extend_the_window() {
        let mut throttle = Throttle::new(Duration::from_millis(20));
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(t0 + Duration::from_millis(15)));
        assert!(throttle.admit(t0 + Duration::from_millis(25)));
    }

    #[test]
    fn zero_interval_admits_everything() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(throttle.admit(t0));
    }

    #[test]
    fn clock_going_backwards_is_swallowed_not_panicking() {
        let mut throttle = Throttle::new(Duration::from_millis(20));
        let t0 = Instant::now() + Duration::from_secs(1);
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(t0 - Duration::from_millis(500)));
        throttle.reset();
        assert!(throttle.admit(t0 - Duration::from_millis(500)));
    }
}
