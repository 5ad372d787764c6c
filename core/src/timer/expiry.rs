use std::time::Duration;

/// A deadline relative to some [Clock](super::Clock)
///
/// An expiration timer is either a fixed point in time, or "forever",
/// in which case it never expires.
/// Timers are inspected through a [TimerView](TimerView) snapshot taken at a
/// particular `now`, so a single decision never observes time moving under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpirationTimer {
    deadline: Option<Duration>,
}

impl ExpirationTimer {
    /// A timer that never expires
    pub fn forever() -> Self {
        ExpirationTimer { deadline: None }
    }

    /// A timer that is already expired
    pub fn expired() -> Self {
        ExpirationTimer {
            deadline: Some(Duration::ZERO),
        }
    }

    /// A timer expiring `duration` after `now`
    pub fn after(now: Duration, duration: Duration) -> Self {
        ExpirationTimer {
            deadline: Some(now.saturating_add(duration)),
        }
    }

    /// Like [after](ExpirationTimer::after), but `None` produces a timer that never expires
    pub fn from_now(now: Duration, duration: Option<Duration>) -> Self {
        match duration {
            Some(d) => ExpirationTimer::after(now, d),
            None => ExpirationTimer::forever(),
        }
    }

    /// The absolute deadline, or `None` for a timer that never expires
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Returns `true` if this timer never expires
    pub fn is_forever(&self) -> bool {
        self.deadline.is_none()
    }

    /// Take a snapshot of this timer at `now`
    pub fn view(&self, now: Duration) -> TimerView {
        TimerView {
            remaining: self.deadline.map(|d| d.saturating_sub(now)),
        }
    }

    /// Shorthand for `self.view(now).expired()`
    pub fn is_expired(&self, now: Duration) -> bool {
        self.view(now).expired()
    }
}

impl Default for ExpirationTimer {
    fn default() -> Self {
        ExpirationTimer::forever()
    }
}

/// A point-in-time view of an [ExpirationTimer](ExpirationTimer)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerView {
    remaining: Option<Duration>,
}

impl TimerView {
    /// Returns `true` if the deadline has been reached
    pub fn expired(&self) -> bool {
        self.remaining == Some(Duration::ZERO)
    }

    /// Time left until expiry, or `None` if the timer never expires
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }
}
