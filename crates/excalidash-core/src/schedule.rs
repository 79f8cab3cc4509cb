//! Timer-driven schedulers for the editing loop.
//!
//! None of these spawn timers. The owner calls `poll(now)` from its loop and
//! acts on whatever comes back, which keeps every cadence testable with
//! synthetic instants.

use std::time::{Duration, Instant};

/// Delays a payload until input has been quiet for `delay`.
///
/// Each `schedule` replaces the pending payload and restarts the window.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    deadline: Option<Instant>,
    pending: Option<T>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending payload and restart the quiet window.
    pub fn schedule(&mut self, payload: T, now: Instant) {
        self.pending = Some(payload);
        self.deadline = Some(now + self.delay);
    }

    /// Take the payload if the quiet window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Take the payload immediately, bypassing the timer.
    pub fn flush_now(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    /// Drop the pending payload without running it.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Leading + trailing throttle.
///
/// The first call after an idle period fires immediately and opens a window.
/// Calls inside the window replace a single pending payload, which fires when
/// the window closes and opens the next one. The final payload of a burst is
/// therefore never lost.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    window_start: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: None,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Offer a payload. Returns it back if it should fire now.
    pub fn schedule(&mut self, payload: T, now: Instant) -> Option<T> {
        match self.window_start {
            Some(start) if now.saturating_duration_since(start) < self.interval => {
                self.pending = Some(payload);
                None
            }
            _ => {
                // A newer payload supersedes a trailing one that was never polled.
                self.pending = None;
                self.window_start = Some(now);
                Some(payload)
            }
        }
    }

    /// Fire the trailing payload once the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let start = self.window_start?;
        if now.saturating_duration_since(start) < self.interval {
            return None;
        }
        match self.pending.take() {
            Some(payload) => {
                self.window_start = Some(now);
                Some(payload)
            }
            None => {
                self.window_start = None;
                None
            }
        }
    }

    /// Take the trailing payload immediately.
    pub fn flush_now(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.window_start = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Hard rate cap: at most one acquisition per interval, excess is dropped.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True if at least `interval` elapsed since the last successful acquire.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let ready = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Fixed-interval tick used to drain buffers at a steady cadence.
#[derive(Debug)]
pub struct FlushTicker {
    interval: Duration,
    next: Option<Instant>,
}

impl FlushTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval, next: None }
    }

    /// True at most once per interval.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now < next => false,
            _ => {
                self.next = Some(now + self.interval);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debounce_waits_for_quiet() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(1000));
        d.schedule(1, t0);
        d.schedule(2, t0 + ms(500));
        assert_eq!(d.poll(t0 + ms(1000)), None);
        assert_eq!(d.poll(t0 + ms(1500)), Some(2));
        assert_eq!(d.poll(t0 + ms(3000)), None);
    }

    #[test]
    fn test_debounce_flush_and_cancel() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(ms(1000));
        d.schedule("a", t0);
        assert_eq!(d.flush_now(), Some("a"));
        assert_eq!(d.poll(t0 + ms(2000)), None);

        d.schedule("b", t0);
        d.cancel();
        assert!(!d.is_pending());
        assert_eq!(d.poll(t0 + ms(2000)), None);
    }

    #[test]
    fn test_throttle_leading_and_trailing() {
        let t0 = Instant::now();
        let mut th = Throttle::new(ms(100));
        assert_eq!(th.schedule(1, t0), Some(1));
        assert_eq!(th.schedule(2, t0 + ms(10)), None);
        assert_eq!(th.schedule(3, t0 + ms(20)), None);
        assert_eq!(th.poll(t0 + ms(50)), None);
        assert_eq!(th.poll(t0 + ms(100)), Some(3));
        // Window reopened at 100ms with nothing pending.
        assert_eq!(th.poll(t0 + ms(200)), None);
        assert_eq!(th.schedule(4, t0 + ms(250)), Some(4));
    }

    #[test]
    fn test_throttle_burst_emission_count() {
        let t0 = Instant::now();
        let mut th = Throttle::new(ms(100));
        let mut fired = Vec::new();
        for i in 0..20u64 {
            let now = t0 + ms(i * 10);
            fired.extend(th.poll(now));
            fired.extend(th.schedule(i, now));
        }
        fired.extend(th.poll(t0 + ms(200)));
        fired.extend(th.poll(t0 + ms(300)));
        assert!(fired.len() <= 3);
        assert_eq!(fired.first(), Some(&0));
        assert_eq!(fired.last(), Some(&19));
    }

    #[test]
    fn test_rate_limiter_drops_excess() {
        let t0 = Instant::now();
        let mut rl = RateLimiter::new(ms(50));
        assert!(rl.try_acquire(t0));
        assert!(!rl.try_acquire(t0 + ms(49)));
        assert!(rl.try_acquire(t0 + ms(50)));
        assert!(!rl.try_acquire(t0 + ms(60)));
    }

    #[test]
    fn test_flush_ticker() {
        let t0 = Instant::now();
        let mut tick = FlushTicker::new(ms(16));
        assert!(tick.due(t0));
        assert!(!tick.due(t0 + ms(10)));
        assert!(tick.due(t0 + ms(16)));
    }
}
