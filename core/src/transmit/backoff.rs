use crate::timer::scale;
use std::time::Duration;

mod defaults {
    use std::time::Duration;

    pub const MIN: Duration = Duration::from_millis(20);
    pub const MAX: Duration = Duration::from_millis(7_300);
    pub const FACTOR: f64 = 1.7;
}

/// Multiplicative retry backoff, clamped between a floor and a ceiling
///
/// The first interval is the floor, every following interval is the previous one
/// multiplied by `factor`, up to `max`.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryBackoff {
    curr: Option<Duration>,
    min: Duration,
    max: Duration,
    factor: f64,
}

impl RetryBackoff {
    pub fn new(min: Duration, factor: f64, max: Duration) -> Self {
        RetryBackoff {
            curr: None,
            min,
            max: max.max(min),
            factor,
        }
    }

    /// The interval to wait before the next attempt
    pub fn next_interval(&mut self) -> Duration {
        let next = match self.curr {
            None => self.min,
            Some(curr) => scale(curr, self.factor).max(self.min).min(self.max),
        };
        self.curr = Some(next);
        next
    }

    /// The most recently handed out interval
    pub fn curr(&self) -> Option<Duration> {
        self.curr
    }

    pub fn reset(&mut self) {
        self.curr = None;
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        RetryBackoff::new(defaults::MIN, defaults::FACTOR, defaults::MAX)
    }
}
