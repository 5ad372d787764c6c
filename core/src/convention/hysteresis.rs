use crate::{actors::UniquePath, timer::scale};
use std::time::Duration;

/// Settings for a [HysteresisDelaySender](HysteresisDelaySender)
#[derive(Clone, Debug, PartialEq)]
pub struct HysteresisSettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub rate: f64,
}

impl Default for HysteresisSettings {
    fn default() -> Self {
        HysteresisSettings {
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(45),
            rate: 1.2,
        }
    }
}

/// What a call to the sender released
#[derive(Debug, PartialEq)]
pub struct HysteresisRelease<T> {
    /// Send these now, in order.
    pub transmit: Vec<T>,
    /// Replaced by a newer item for the same peer and kind, never sent.
    pub superseded: Vec<T>,
}

impl<T> HysteresisRelease<T> {
    fn empty() -> Self {
        HysteresisRelease {
            transmit: Vec::new(),
            superseded: Vec::new(),
        }
    }
}

/// Coalesces bursts of control messages
///
/// The first send passes through immediately and opens a blackout window of
/// `min_delay`. Sends during the window are held back, only the newest one per
/// `(peer, kind)` survives, and each of them stretches the window by `rate` up to
/// `max_delay`. When the window closes the survivors go out and a new window of the
/// same width opens. Only a window that closes with nothing queued shrinks by `rate`,
/// back to nothing once it falls below `min_delay`, so two peers answering each other
/// settle at one exchange per `max_delay`.
pub struct HysteresisDelaySender<T> {
    settings: HysteresisSettings,
    current: Option<Duration>,
    window_end: Option<Duration>,
    queued: Vec<(UniquePath, &'static str, T)>,
}

impl<T> HysteresisDelaySender<T> {
    pub fn new(settings: HysteresisSettings) -> Self {
        HysteresisDelaySender {
            settings,
            current: None,
            window_end: None,
            queued: Vec::new(),
        }
    }

    fn in_blackout(&self, now: Duration) -> bool {
        self.window_end.map(|end| now < end).unwrap_or(false)
    }

    /// Offer `item` for `peer`, coalesced by `kind`
    pub fn send(
        &mut self,
        now: Duration,
        peer: UniquePath,
        kind: &'static str,
        item: T,
    ) -> HysteresisRelease<T> {
        let mut release = HysteresisRelease::empty();
        if !self.in_blackout(now) {
            release.transmit.extend(self.queued.drain(..).map(|(_, _, t)| t));
            release.transmit.push(item);
            self.current = Some(self.settings.min_delay);
        } else {
            if let Some(pos) = self
                .queued
                .iter()
                .position(|(p, k, _)| *p == peer && *k == kind)
            {
                let (_, _, old) = self.queued.remove(pos);
                release.superseded.push(old);
            }
            self.queued.push((peer, kind, item));
            let grown = match self.current {
                Some(current) => scale(current, self.settings.rate),
                None => self.settings.min_delay,
            };
            self.current = Some(grown.min(self.settings.max_delay));
        }
        self.window_end = self.current.map(|current| now + current);
        release
    }

    /// Release whatever is due at `now`
    pub fn check_sends(&mut self, now: Duration) -> Vec<T> {
        if self.in_blackout(now) || self.window_end.is_none() {
            return Vec::new();
        }
        if self.queued.is_empty() {
            self.current = self.current.and_then(|current| {
                let decayed = scale(current, 1.0 / self.settings.rate);
                if decayed < self.settings.min_delay {
                    None
                } else {
                    Some(decayed)
                }
            });
        }
        self.window_end = self.current.map(|current| now + current);
        self.queued.drain(..).map(|(_, _, t)| t).collect()
    }

    /// The item held back for `peer` and `kind`, if any
    pub fn queued_for(&mut self, peer: &UniquePath, kind: &str) -> Option<&mut T> {
        self.queued
            .iter_mut()
            .find(|(p, k, _)| p == peer && *k == kind)
            .map(|(_, _, item)| item)
    }

    /// Drop everything queued for `peer` and return it
    pub fn cancel(&mut self, peer: &UniquePath) -> Vec<T> {
        let mut cancelled = Vec::new();
        let mut kept = Vec::with_capacity(self.queued.len());
        for (p, kind, item) in self.queued.drain(..) {
            if p == *peer {
                cancelled.push(item);
            } else {
                kept.push((p, kind, item));
            }
        }
        self.queued = kept;
        cancelled
    }

    /// When [check_sends](HysteresisDelaySender::check_sends) next has anything to release
    pub fn next_deadline(&self) -> Option<Duration> {
        if self.queued.is_empty() {
            None
        } else {
            self.window_end
        }
    }

    /// The current width of the blackout window
    pub fn current_delay(&self) -> Option<Duration> {
        self.current
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }
}
