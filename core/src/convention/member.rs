use crate::{messaging::Capabilities, timer::ExpirationTimer};
use std::time::Duration;

/// Ping bookkeeping for a peer this system has to invite actively
#[derive(Clone, Debug, PartialEq)]
pub struct PreRegistration {
    /// When the next invitation is due.
    pub ping_valid: ExpirationTimer,
    /// An invitation is on its way and has not completed yet.
    pub pinging: bool,
}

impl PreRegistration {
    pub fn needs_ping(&self, now: Duration) -> bool {
        !self.pinging && self.ping_valid.is_expired(now)
    }
}

/// What this system knows about one peer system
#[derive(Clone, Debug, PartialEq)]
pub struct ConventionMemberData {
    /// The capabilities the peer last advertised.
    pub capabilities: Capabilities,
    /// Renewed by every registration from the peer.
    pub liveness: ExpirationTimer,
    pub pre_registration: Option<PreRegistration>,
    /// Permanent entries survive liveness timeouts.
    pub permanent: bool,
    /// The peer has not sent a full registration yet.
    pub pre_reg_only: bool,
    /// Number of actor creations handed to this peer.
    pub delegated: usize,
}

impl ConventionMemberData {
    pub fn new(now: Duration, lifetime: Duration) -> Self {
        ConventionMemberData {
            capabilities: Capabilities::new(),
            liveness: ExpirationTimer::after(now, lifetime),
            pre_registration: None,
            permanent: false,
            pre_reg_only: true,
            delegated: 0,
        }
    }

    /// A fully registered peer whose registration has not lapsed
    pub fn is_alive(&self, now: Duration) -> bool {
        !self.pre_reg_only && (self.permanent || !self.liveness.is_expired(now))
    }

    /// Returns `true` if the entry is due for removal
    pub fn is_expired(&self, now: Duration) -> bool {
        !self.permanent && self.liveness.is_expired(now)
    }

    pub fn refresh(&mut self, now: Duration, lifetime: Duration) {
        self.liveness = ExpirationTimer::after(now, lifetime);
    }
}
