use crate::timer::scale;
use std::{collections::VecDeque, time::Duration};

/// Slows down outbound message generation as the send rate approaches a maximum
///
/// Sends are counted over a sliding window. Up to `threshold × max_rate` sends per
/// window pass without delay. Beyond that every send is delayed, and the delay grows
/// quadratically with how far past the threshold the rate is, reaching a full window
/// at `max_rate`.
#[derive(Debug, Clone)]
pub struct RateThrottle {
    window: Duration,
    max_rate: usize,
    threshold: f64,
    recent: VecDeque<Duration>,
}

impl RateThrottle {
    pub fn new(window: Duration, max_rate: usize, threshold: f64) -> Self {
        RateThrottle {
            window,
            max_rate: max_rate.max(1),
            threshold: threshold.max(0.0).min(1.0),
            recent: VecDeque::new(),
        }
    }

    /// Record a send at `now` and return the delay to impose on it
    pub fn record(&mut self, now: Duration) -> Duration {
        self.expire(now);
        self.recent.push_back(now);
        self.delay_for(self.recent.len())
    }

    /// The number of sends in the current window
    pub fn current_rate(&mut self, now: Duration) -> usize {
        self.expire(now);
        self.recent.len()
    }

    fn delay_for(&self, count: usize) -> Duration {
        let limit = self.threshold * self.max_rate as f64;
        let count = count as f64;
        if count <= limit {
            return Duration::ZERO;
        }
        let span = (self.max_rate as f64 - limit).max(1.0);
        let excess = ((count - limit) / span).min(1.0);
        scale(self.window, excess * excess)
    }

    fn expire(&mut self, now: Duration) {
        while let Some(oldest) = self.recent.front() {
            if now.saturating_sub(*oldest) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unthrottled_below_threshold() {
        let mut throttle = RateThrottle::new(Duration::from_secs(1), 100, 0.7);
        for _ in 0..70 {
            assert_eq!(Duration::ZERO, throttle.record(Duration::ZERO));
        }
        assert!(throttle.record(Duration::ZERO) > Duration::ZERO);
    }

    #[test]
    fn delay_accelerates_then_saturates() {
        let mut throttle = RateThrottle::new(Duration::from_secs(1), 100, 0.7);
        for _ in 0..70 {
            throttle.record(Duration::ZERO);
        }
        let mut last = Duration::ZERO;
        let mut increments = Vec::new();
        for _ in 0..30 {
            let delay = throttle.record(Duration::ZERO);
            assert!(delay > last);
            increments.push(delay - last);
            last = delay;
        }
        assert!(increments.last() > increments.first());
        assert_eq!(Duration::from_secs(1), last);
        assert_eq!(Duration::from_secs(1), throttle.record(Duration::ZERO));
    }

    #[test]
    fn decelerates_as_the_window_slides() {
        let mut throttle = RateThrottle::new(Duration::from_secs(1), 10, 0.7);
        for _ in 0..10 {
            throttle.record(Duration::ZERO);
        }
        assert_eq!(10, throttle.current_rate(Duration::from_millis(999)));
        assert_eq!(Duration::ZERO, throttle.record(Duration::from_secs(1)));
        assert_eq!(1, throttle.current_rate(Duration::from_secs(1)));
    }
}
