use super::*;
use std::{
    convert::TryFrom,
    sync::atomic::{AtomicU64, Ordering},
};

/// A clock that uses virtual time
///
/// Time only moves when [advance](SimulationClock::advance) or
/// [advance_to](SimulationClock::advance_to) is called. Clones share the same time,
/// so every system in a simulated scenario observes a single timeline.
#[derive(Debug, Clone, Default)]
pub struct SimulationClock {
    nanos: Arc<AtomicU64>,
}

impl SimulationClock {
    /// Create a new simulation clock starting at `0`
    pub fn new() -> SimulationClock {
        SimulationClock::default()
    }

    /// Move virtual time forward by `by`
    pub fn advance(&self, by: Duration) {
        let delta = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Move virtual time forward to `target`
    ///
    /// Targets in the past are ignored, virtual time never runs backwards.
    pub fn advance_to(&self, target: Duration) {
        let target = u64::try_from(target.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_max(target, Ordering::SeqCst);
    }

    /// A shareable handle for handing to a [SystemConfig](crate::prelude::SystemConfig)
    pub fn shared(&self) -> Arc<dyn Clock> {
        Arc::new(self.clone())
    }
}

impl Clock for SimulationClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = SimulationClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(Duration::from_millis(250), other.now());
        other.advance_to(Duration::from_millis(100));
        assert_eq!(Duration::from_millis(250), clock.now());
        other.advance_to(Duration::from_secs(2));
        assert_eq!(Duration::from_secs(2), clock.now());
    }
}
