//! Time sources and deadline bookkeeping for the event loop.
//!
//! All time in the runtime is expressed as a [Duration](std::time::Duration)
//! measured from the origin of a [Clock](Clock). This keeps real and simulated
//! time interchangeable: a system built on a [SimulationClock](SimulationClock)
//! never reads the wall clock.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

mod expiry;
mod schedule;
mod simulation;

pub use expiry::{ExpirationTimer, TimerView};
pub use schedule::{ScheduledWakeup, WakeupSchedule};
pub use simulation::SimulationClock;

/// A monotonic time source
pub trait Clock: Send + Sync {
    /// The time elapsed since this clock's origin.
    fn now(&self) -> Duration;
}

impl fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clock(now={:?})", self.now())
    }
}

/// A clock backed by [Instant](std::time::Instant)
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a new clock whose origin is the current instant
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }

    /// Create a shareable clock for handing to a [SystemConfig](crate::prelude::SystemConfig)
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(SystemClock::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Returns the earliest of two optional deadlines
pub(crate) fn earliest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Multiply a duration by a float factor, rounding to the nearest nanosecond.
pub(crate) fn scale(d: Duration, factor: f64) -> Duration {
    let nanos = d.as_nanos() as f64 * factor;
    if !nanos.is_finite() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos.round() as u64)
    }
}
