//! Membership of a system in a convention of cooperating systems.
//!
//! Leadership is static: the configured candidate list is walked in order and the first
//! candidate that is this system, or that is known and alive, leads. Members register
//! with the leader periodically, the leader forgets members that stop doing so.
//! Peers that cannot dial in are pre-registered and invited instead.
//!
//! [LocalConventionState](LocalConventionState) is a pure state machine: every operation
//! returns the [ConventionEffect](ConventionEffect)s the admin has to carry out.

use crate::{
    actors::{ActorAddress, UniquePath},
    messaging::{Capabilities, Message, Register},
    timer::{scale, ExpirationTimer},
    transmit::CompletionTag,
    TroupeLogger,
};
use slog::{debug, info};
use std::{collections::BTreeMap, convert::TryFrom, time::Duration};

mod hysteresis;
mod member;

pub use hysteresis::{HysteresisDelaySender, HysteresisRelease, HysteresisSettings};
pub use member::{ConventionMemberData, PreRegistration};

/// Timing of the convention protocol
#[derive(Clone, Debug, PartialEq)]
pub struct ConventionSettings {
    pub reregistration_period: Duration,
    /// Registrations a member may miss before the leader drops it.
    pub missed_checkins: usize,
    /// Pre-registered peers are invited every `reregistration_period * ping_factor`.
    pub ping_factor: f64,
}

impl Default for ConventionSettings {
    fn default() -> Self {
        ConventionSettings {
            reregistration_period: Duration::from_secs(7 * 60 + 22),
            missed_checkins: 3,
            ping_factor: 1.1,
        }
    }
}

/// Work the admin has to do on behalf of the convention
#[derive(Clone, Debug, PartialEq)]
pub enum ConventionEffect {
    /// Send `message` to the admin `to`.
    Send {
        to: UniquePath,
        message: Message,
        tag: Option<CompletionTag>,
    },
    /// Drop any coalesced sends still waiting for the peer.
    CancelSends(UniquePath),
    /// Tear down the connection to the peer.
    ResetConnection(UniquePath),
    /// Tell an observer about a membership change.
    Notify {
        observer: ActorAddress,
        message: Message,
    },
}

/// The convention as seen by one system
pub struct LocalConventionState {
    me: UniquePath,
    candidates: Vec<UniquePath>,
    capabilities: Capabilities,
    settings: ConventionSettings,
    members: BTreeMap<UniquePath, ConventionMemberData>,
    observers: Vec<ActorAddress>,
    registered_with: Option<UniquePath>,
    leader_failures: usize,
    reregister: ExpirationTimer,
    last_leader: Option<UniquePath>,
    log: TroupeLogger,
}

impl LocalConventionState {
    /// Create the state for the system whose admin is `me`
    ///
    /// An empty candidate list means there is no convention and this system leads itself.
    pub fn new(
        me: UniquePath,
        candidates: Vec<UniquePath>,
        capabilities: Capabilities,
        settings: ConventionSettings,
        log: TroupeLogger,
    ) -> Self {
        let mut unique: Vec<UniquePath> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let candidate = candidate.direct();
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        LocalConventionState {
            me: me.direct(),
            candidates: unique,
            capabilities,
            settings,
            members: BTreeMap::new(),
            observers: Vec::new(),
            registered_with: None,
            leader_failures: 0,
            reregister: ExpirationTimer::expired(),
            last_leader: None,
            log,
        }
    }

    pub fn me(&self) -> &UniquePath {
        &self.me
    }

    pub fn candidates(&self) -> &[UniquePath] {
        &self.candidates
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn member(&self, peer: &UniquePath) -> Option<&ConventionMemberData> {
        self.members.get(peer)
    }

    /// Peers that have fully registered and have not lapsed
    pub fn live_members(&self, now: Duration) -> Vec<UniquePath> {
        self.members
            .iter()
            .filter(|(_, data)| data.is_alive(now))
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    fn lifetime(&self) -> Duration {
        let checkins = u32::try_from(self.settings.missed_checkins).unwrap_or(u32::MAX);
        self.settings.reregistration_period.saturating_mul(checkins)
    }

    fn ping_period(&self) -> Duration {
        scale(self.settings.reregistration_period, self.settings.ping_factor)
    }

    fn is_alive(&self, peer: &UniquePath, now: Duration) -> bool {
        self.members
            .get(peer)
            .map(|data| data.is_alive(now))
            .unwrap_or(false)
    }

    /// Returns `true` if this system currently leads the convention
    pub fn is_leader(&self, now: Duration) -> bool {
        if self.candidates.is_empty() {
            return true;
        }
        for candidate in self.candidates.iter() {
            if *candidate == self.me {
                return true;
            }
            if self.is_alive(candidate, now) {
                return false;
            }
        }
        false
    }

    /// The current leader, if any is known
    pub fn leader(&self, now: Duration) -> Option<UniquePath> {
        if self.candidates.is_empty() {
            return Some(self.me.clone());
        }
        self.candidates
            .iter()
            .find(|candidate| **candidate == self.me || self.is_alive(candidate, now))
            .cloned()
    }

    fn register(&self, first_time: bool, pre_register: bool) -> Message {
        Message::Register(Register {
            admin: ActorAddress::Unique(self.me.clone()),
            capabilities: self.capabilities.clone(),
            first_time,
            pre_register,
        })
    }

    fn send_register(&self, to: &UniquePath, first_time: bool, pre_register: bool) -> ConventionEffect {
        ConventionEffect::Send {
            to: to.clone(),
            message: self.register(first_time, pre_register),
            tag: Some(CompletionTag::ConventionRegistration { peer: to.clone() }),
        }
    }

    fn notify(&self, peer: &UniquePath, capabilities: &Capabilities, added: bool) -> Vec<ConventionEffect> {
        self.observers
            .iter()
            .map(|observer| ConventionEffect::Notify {
                observer: observer.clone(),
                message: Message::ConventionUpdate {
                    remote_admin: ActorAddress::Unique(peer.clone()),
                    capabilities: capabilities.clone(),
                    added,
                },
            })
            .collect()
    }

    /// Announce this system to every other candidate
    pub fn setup(&mut self, now: Duration) -> Vec<ConventionEffect> {
        self.reregister = ExpirationTimer::after(now, self.settings.reregistration_period);
        let effects: Vec<ConventionEffect> = self
            .candidates
            .iter()
            .filter(|candidate| **candidate != self.me)
            .map(|candidate| {
                let first_time = self.registered_with.as_ref() != Some(candidate);
                self.send_register(candidate, first_time, false)
            })
            .collect();
        if !effects.is_empty() {
            debug!(self.log, "Announcing to {} convention candidates", effects.len());
        }
        effects
    }

    /// Handle a registration from another system
    pub fn got_register(&mut self, now: Duration, reg: Register) -> Vec<ConventionEffect> {
        let sender = match reg.admin.unique() {
            Some(path) => path.direct(),
            None => return Vec::new(),
        };
        if sender == self.me {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let lifetime = self.lifetime();
        if reg.first_time || !self.members.contains_key(&sender) {
            let mut fresh = ConventionMemberData::new(now, lifetime);
            if let Some(old) = self.members.remove(&sender) {
                if !old.pre_reg_only {
                    info!(self.log, "Convention member {} re-joined", sender);
                    effects.extend(self.notify(&sender, &old.capabilities, false));
                }
                fresh.permanent = old.permanent;
                fresh.pre_registration = old.pre_registration;
                fresh.delegated = old.delegated;
            }
            self.members.insert(sender.clone(), fresh);
        }
        let ping_period = self.ping_period();
        let entry = match self.members.get_mut(&sender) {
            Some(entry) => entry,
            None => return effects,
        };
        entry.refresh(now, lifetime);
        if reg.pre_register {
            debug!(self.log, "Pre-registration from {}, inviting", sender);
            entry.permanent = true;
            entry.pre_registration = Some(PreRegistration {
                ping_valid: ExpirationTimer::after(now, ping_period),
                pinging: true,
            });
            effects.push(ConventionEffect::CancelSends(sender.clone()));
            effects.push(ConventionEffect::Send {
                to: sender.clone(),
                message: Message::Invite,
                tag: Some(CompletionTag::ConventionInvite { peer: sender }),
            });
            return effects;
        }
        entry.capabilities = reg.capabilities;
        let joined = entry.pre_reg_only;
        entry.pre_reg_only = false;
        let permanent = entry.permanent;
        let capabilities = entry.capabilities.clone();

        if self.leader(now).as_ref() == Some(&sender) {
            self.registered_with = Some(sender.clone());
            self.leader_failures = 0;
        }
        // repeated exchanges between two answering peers are damped by the hysteresis sender
        if reg.first_time || self.is_leader(now) || permanent {
            effects.push(self.send_register(&sender, false, false));
        }
        if joined {
            info!(self.log, "Convention member {} joined", sender);
            effects.extend(self.notify(&sender, &capabilities, true));
        }
        self.log_leader(now);
        effects
    }

    /// Handle a deregistration
    pub fn got_deregister(
        &mut self,
        now: Duration,
        admin: &ActorAddress,
        pre_registered: bool,
    ) -> Vec<ConventionEffect> {
        let sender = match admin.unique() {
            Some(path) => path.direct(),
            None => return Vec::new(),
        };
        if pre_registered {
            if let Some(entry) = self.members.get_mut(&sender) {
                entry.pre_registration = None;
            }
            return Vec::new();
        }
        let mut effects = Vec::new();
        if let Some(old) = self.members.remove(&sender) {
            info!(self.log, "Convention member {} left", sender);
            if !old.pre_reg_only {
                effects.extend(self.notify(&sender, &old.capabilities, false));
            }
            effects.push(ConventionEffect::ResetConnection(sender.clone()));
            effects.push(ConventionEffect::CancelSends(sender.clone()));
        }
        if self.registered_with.as_ref() == Some(&sender) {
            self.registered_with = None;
        }
        self.log_leader(now);
        effects
    }

    /// Answer an invitation with a registration
    pub fn got_invite(&mut self, _now: Duration, from: &ActorAddress) -> Vec<ConventionEffect> {
        let inviter = match from.unique() {
            Some(path) => path.direct(),
            None => return Vec::new(),
        };
        let first_time = self
            .members
            .get(&inviter)
            .map(|entry| entry.pre_reg_only)
            .unwrap_or(true);
        vec![self.send_register(&inviter, first_time, false)]
    }

    /// The periodic tick
    pub fn check(&mut self, now: Duration) -> Vec<ConventionEffect> {
        let mut effects = Vec::new();
        if self.is_leader(now) {
            let expired: Vec<UniquePath> = self
                .members
                .iter()
                .filter(|(_, data)| data.is_expired(now))
                .map(|(peer, _)| peer.clone())
                .collect();
            for peer in expired {
                if let Some(old) = self.members.remove(&peer) {
                    info!(self.log, "Convention member {} missed its check-ins", peer);
                    if !old.pre_reg_only {
                        effects.extend(self.notify(&peer, &old.capabilities, false));
                    }
                    effects.push(ConventionEffect::CancelSends(peer));
                }
            }
        } else if self.reregister.is_expired(now) {
            match self.leader(now) {
                Some(leader) if leader != self.me => {
                    let first_time = self.registered_with.as_ref() != Some(&leader);
                    debug!(self.log, "Registering with leader {}", leader; "first_time" => first_time);
                    effects.push(self.send_register(&leader, first_time, false));
                    self.reregister = ExpirationTimer::after(now, self.settings.reregistration_period);
                }
                _ => effects.extend(self.setup(now)),
            }
        }
        let due: Vec<UniquePath> = self
            .members
            .iter()
            .filter(|(_, data)| {
                data.pre_registration
                    .as_ref()
                    .map(|pre| pre.needs_ping(now))
                    .unwrap_or(false)
            })
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in due {
            if let Some(pre) = self
                .members
                .get_mut(&peer)
                .and_then(|data| data.pre_registration.as_mut())
            {
                pre.pinging = true;
            }
            effects.push(ConventionEffect::Send {
                to: peer.clone(),
                message: Message::Invite,
                tag: Some(CompletionTag::ConventionInvite { peer }),
            });
        }
        self.log_leader(now);
        effects
    }

    /// Feedback from the transmit of a registration
    ///
    /// Repeated failures to reach the leader make this system forget it.
    pub fn on_registration_sent(
        &mut self,
        now: Duration,
        peer: &UniquePath,
        success: bool,
    ) -> Vec<ConventionEffect> {
        let is_leader_peer = self.leader(now).as_ref() == Some(peer) && *peer != self.me;
        if !is_leader_peer {
            return Vec::new();
        }
        if success {
            self.leader_failures = 0;
            return Vec::new();
        }
        self.leader_failures += 1;
        if self.leader_failures < self.settings.missed_checkins {
            return Vec::new();
        }
        self.leader_failures = 0;
        self.registered_with = None;
        let mut effects = Vec::new();
        let permanent = self.members.get(peer).map(|d| d.permanent).unwrap_or(true);
        if !permanent {
            if let Some(old) = self.members.remove(peer) {
                info!(self.log, "Lost contact with convention leader {}", peer);
                if !old.pre_reg_only {
                    effects.extend(self.notify(peer, &old.capabilities, false));
                }
                effects.push(ConventionEffect::ResetConnection(peer.clone()));
            }
        }
        self.log_leader(now);
        effects
    }

    /// Feedback from the transmit of an invitation
    pub fn on_invite_sent(&mut self, now: Duration, peer: &UniquePath, _success: bool) {
        let ping_period = self.ping_period();
        if let Some(pre) = self
            .members
            .get_mut(peer)
            .and_then(|data| data.pre_registration.as_mut())
        {
            pre.pinging = false;
            pre.ping_valid = ExpirationTimer::after(now, ping_period);
        }
    }

    /// Subscribe `observer` to membership changes
    ///
    /// The observer is told about every current member right away.
    pub fn add_observer(&mut self, now: Duration, observer: ActorAddress) -> Vec<ConventionEffect> {
        if !self.observers.contains(&observer) {
            self.observers.push(observer.clone());
        }
        self.members
            .iter()
            .filter(|(_, data)| data.is_alive(now))
            .map(|(peer, data)| ConventionEffect::Notify {
                observer: observer.clone(),
                message: Message::ConventionUpdate {
                    remote_admin: ActorAddress::Unique(peer.clone()),
                    capabilities: data.capabilities.clone(),
                    added: true,
                },
            })
            .collect()
    }

    pub fn remove_observer(&mut self, observer: &ActorAddress) {
        self.observers.retain(|o| o != observer);
    }

    /// Pick a remote system to host an actor this system cannot
    ///
    /// Among live members that are `compatible` and neither tried already nor `exclude`d,
    /// the one with the fewest delegated actors wins. Without any, a member defers to its leader.
    pub fn find_remote_for<F>(
        &self,
        now: Duration,
        compatible: F,
        already_tried: &[ActorAddress],
        exclude: Option<&UniquePath>,
    ) -> Option<UniquePath>
    where
        F: Fn(&Capabilities) -> bool,
    {
        let eligible = |peer: &UniquePath| {
            *peer != self.me
                && exclude != Some(peer)
                && !already_tried.iter().any(|tried| tried == peer)
        };
        let best = self
            .members
            .iter()
            .filter(|(peer, data)| data.is_alive(now) && eligible(peer) && compatible(&data.capabilities))
            .min_by_key(|(_, data)| data.delegated)
            .map(|(peer, _)| peer.clone());
        match best {
            Some(peer) => Some(peer),
            None if !self.is_leader(now) => self.leader(now).filter(|leader| eligible(leader)),
            None => None,
        }
    }

    /// Count an actor creation handed to `peer`
    pub fn note_delegated(&mut self, peer: &UniquePath) {
        if let Some(data) = self.members.get_mut(peer) {
            data.delegated += 1;
        }
    }

    /// Advertise new capabilities
    pub fn update_capabilities(&mut self, now: Duration, capabilities: Capabilities) -> Vec<ConventionEffect> {
        self.capabilities = capabilities;
        if self.is_leader(now) {
            self.live_members(now)
                .iter()
                .map(|peer| self.send_register(peer, false, false))
                .collect()
        } else {
            match self.leader(now) {
                Some(leader) => {
                    let first_time = self.registered_with.as_ref() != Some(&leader);
                    vec![self.send_register(&leader, first_time, false)]
                }
                None => Vec::new(),
            }
        }
    }

    /// Register with a system that cannot dial in, so that it invites this system
    pub fn pre_register(&mut self, now: Duration, remote: UniquePath) -> Vec<ConventionEffect> {
        let remote = remote.direct();
        if remote == self.me {
            return Vec::new();
        }
        let lifetime = self.lifetime();
        let entry = self
            .members
            .entry(remote.clone())
            .or_insert_with(|| ConventionMemberData::new(now, lifetime));
        entry.permanent = true;
        info!(self.log, "Pre-registering with {}", remote);
        vec![self.send_register(&remote, true, true)]
    }

    /// Leave the convention
    pub fn shutdown(&mut self) -> Vec<ConventionEffect> {
        let me = ActorAddress::Unique(self.me.clone());
        let effects = self
            .members
            .iter()
            .map(|(peer, data)| ConventionEffect::Send {
                to: peer.clone(),
                message: Message::DeRegister {
                    admin: me.clone(),
                    pre_registered: data.pre_reg_only,
                },
                tag: None,
            })
            .collect();
        self.members.clear();
        self.registered_with = None;
        effects
    }

    fn log_leader(&mut self, now: Duration) {
        let leader = self.leader(now);
        if leader != self.last_leader {
            match leader.as_ref() {
                Some(l) if *l == self.me => info!(self.log, "This system leads the convention"),
                Some(l) => info!(self.log, "Convention leader is {}", l),
                None => info!(self.log, "No convention leader known"),
            }
            self.last_leader = leader;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actors::SystemPath,
        messaging::{capabilities, satisfies, CapabilityValue},
        runtime::default_logger,
    };

    fn admin(last: u8) -> UniquePath {
        format!("tcp://10.0.0.{}:1900", last)
            .parse::<SystemPath>()
            .expect("system")
            .admin()
    }

    fn state(me: UniquePath, candidates: Vec<UniquePath>) -> LocalConventionState {
        LocalConventionState::new(
            me,
            candidates,
            Capabilities::new(),
            ConventionSettings {
                reregistration_period: Duration::from_secs(10),
                missed_checkins: 3,
                ping_factor: 1.1,
            },
            default_logger().clone(),
        )
    }

    fn register(from: &UniquePath, caps: Capabilities, first_time: bool, pre_register: bool) -> Register {
        Register {
            admin: ActorAddress::Unique(from.clone()),
            capabilities: caps,
            first_time,
            pre_register,
        }
    }

    fn notifications(effects: &[ConventionEffect]) -> Vec<(bool, Capabilities)> {
        effects
            .iter()
            .filter_map(|e| match e {
                ConventionEffect::Notify {
                    message:
                        Message::ConventionUpdate {
                            capabilities,
                            added,
                            ..
                        },
                    ..
                } => Some((*added, capabilities.clone())),
                _ => None,
            })
            .collect()
    }

    fn observer() -> ActorAddress {
        ActorAddress::Unique(UniquePath::new(admin(1).system().clone(), uuid::Uuid::new_v4()))
    }

    #[test]
    fn pre_registration_is_answered_with_an_invite() {
        let (s1, s2) = (admin(1), admin(2));
        let mut conv = state(s1, Vec::new());
        conv.add_observer(Duration::ZERO, observer());
        let effects = conv.got_register(
            Duration::ZERO,
            register(&s2, capabilities(vec![("Admin Port", 2i64)]), false, true),
        );
        assert_eq!(
            vec![
                ConventionEffect::CancelSends(s2.clone()),
                ConventionEffect::Send {
                    to: s2.clone(),
                    message: Message::Invite,
                    tag: Some(CompletionTag::ConventionInvite { peer: s2 }),
                },
            ],
            effects
        );
    }

    #[test]
    fn full_join_after_invite() {
        let (s1, s2) = (admin(1), admin(2));
        let mut conv = state(s1.clone(), Vec::new());
        conv.add_observer(Duration::ZERO, observer());
        conv.got_register(
            Duration::ZERO,
            register(&s2, capabilities(vec![("Admin Port", 2i64)]), false, true),
        );
        let apple = capabilities(vec![("apple pie", "hot")]);
        let effects = conv.got_register(Duration::ZERO, register(&s2, apple.clone(), true, false));
        let replies: Vec<&ConventionEffect> = effects
            .iter()
            .filter(|e| matches!(e, ConventionEffect::Send { .. }))
            .collect();
        match replies.as_slice() {
            [ConventionEffect::Send {
                to,
                message: Message::Register(reg),
                ..
            }] => {
                assert_eq!(&s2, to);
                assert!(!reg.first_time);
                assert_eq!(ActorAddress::Unique(s1), reg.admin);
            }
            other => panic!("Unexpected replies: {:?}", other),
        }
        assert_eq!(vec![(true, apple.clone())], notifications(&effects));
        // a system leading itself answers every registration, repeated ones included
        let again = conv.got_register(Duration::ZERO, register(&s2, apple.clone(), false, false));
        assert!(notifications(&again).is_empty());
        match again.as_slice() {
            [ConventionEffect::Send {
                to,
                message: Message::Register(reg),
                ..
            }] => {
                assert_eq!(&s2, to);
                assert!(!reg.first_time);
            }
            other => panic!("Unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn missed_checkins_remove_a_member_once() {
        let (leader, member) = (admin(1), admin(2));
        let mut conv = state(leader.clone(), vec![leader]);
        conv.add_observer(Duration::ZERO, observer());
        let joined = conv.got_register(Duration::ZERO, register(&member, Capabilities::new(), true, false));
        assert_eq!(1, notifications(&joined).len());
        let mut removals = 0;
        for tick in 1..=60 {
            let effects = conv.check(Duration::from_secs(tick));
            for (added, _) in notifications(&effects) {
                assert!(!added);
                removals += 1;
            }
            if tick < 30 {
                assert_eq!(0, removals, "removed early at {}s", tick);
            }
        }
        assert_eq!(1, removals);
        assert!(conv.member(&member).is_none());
    }

    #[test]
    fn leadership_follows_candidate_order() {
        let (a, b, c) = (admin(1), admin(2), admin(3));
        let candidates = vec![a.clone(), b.clone(), c.clone()];
        let now = Duration::ZERO;
        let mut at_a = state(a.clone(), candidates.clone());
        let mut at_b = state(b.clone(), candidates.clone());
        let mut at_c = state(c.clone(), candidates);
        for conv in [&mut at_b, &mut at_c].iter_mut() {
            conv.got_register(now, register(&a, Capabilities::new(), false, false));
        }
        at_c.got_register(now, register(&b, Capabilities::new(), true, false));
        at_a.got_register(now, register(&b, Capabilities::new(), true, false));
        assert!(at_a.is_leader(now));
        assert!(!at_b.is_leader(now));
        assert!(!at_c.is_leader(now));
        assert_eq!(Some(a.clone()), at_c.leader(now));

        let gone = ActorAddress::Unique(a);
        at_b.got_deregister(now, &gone, false);
        at_c.got_deregister(now, &gone, false);
        assert!(at_b.is_leader(now));
        assert!(!at_c.is_leader(now));
        assert_eq!(Some(b), at_c.leader(now));
    }

    #[test]
    fn members_drop_an_unreachable_leader() {
        let (a, b) = (admin(1), admin(2));
        let mut at_b = state(b.clone(), vec![a.clone(), b]);
        let now = Duration::ZERO;
        at_b.got_register(now, register(&a, Capabilities::new(), false, false));
        assert!(!at_b.is_leader(now));
        assert!(at_b.on_registration_sent(now, &a, false).is_empty());
        assert!(at_b.on_registration_sent(now, &a, false).is_empty());
        let effects = at_b.on_registration_sent(now, &a, false);
        assert!(effects.contains(&ConventionEffect::ResetConnection(a)));
        assert!(at_b.is_leader(now));
    }

    #[test]
    fn members_reregister_with_the_leader() {
        let (a, b) = (admin(1), admin(2));
        let mut at_b = state(b.clone(), vec![a.clone(), b]);
        let setup = at_b.setup(Duration::ZERO);
        assert_eq!(1, setup.len());
        at_b.got_register(Duration::ZERO, register(&a, Capabilities::new(), false, false));
        assert!(at_b.check(Duration::from_secs(5)).is_empty());
        match at_b.check(Duration::from_secs(10)).as_slice() {
            [ConventionEffect::Send {
                to,
                message: Message::Register(reg),
                ..
            }] => {
                assert_eq!(&a, to);
                assert!(!reg.first_time);
            }
            other => panic!("Unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn pre_registered_peers_are_pinged() {
        let (s1, s2) = (admin(1), admin(2));
        let mut conv = state(s1, Vec::new());
        conv.got_register(Duration::ZERO, register(&s2, Capabilities::new(), false, true));
        assert!(conv.check(Duration::from_secs(20)).is_empty());
        conv.on_invite_sent(Duration::from_secs(20), &s2, true);
        assert!(conv.check(Duration::from_secs(30)).is_empty());
        let effects = conv.check(Duration::from_secs(31));
        assert_eq!(
            vec![ConventionEffect::Send {
                to: s2.clone(),
                message: Message::Invite,
                tag: Some(CompletionTag::ConventionInvite { peer: s2 }),
            }],
            effects
        );
    }

    #[test]
    fn placement_prefers_compatible_and_least_loaded() {
        let (me, gpu1, gpu2, plain) = (admin(1), admin(2), admin(3), admin(4));
        let mut conv = state(me.clone(), Vec::new());
        let now = Duration::ZERO;
        let gpu = capabilities(vec![("GPU", true)]);
        for peer in [&gpu1, &gpu2].iter() {
            conv.got_register(now, register(peer, gpu.clone(), true, false));
        }
        conv.got_register(now, register(&plain, Capabilities::new(), true, false));
        let wants_gpu = |caps: &Capabilities| satisfies(caps, &gpu);
        assert_eq!(Some(gpu1.clone()), conv.find_remote_for(now, wants_gpu, &[], None));
        conv.note_delegated(&gpu1);
        assert_eq!(Some(gpu2.clone()), conv.find_remote_for(now, wants_gpu, &[], None));
        let tried = vec![ActorAddress::Unique(me), ActorAddress::Unique(gpu2.clone())];
        assert_eq!(Some(gpu1.clone()), conv.find_remote_for(now, wants_gpu, &tried, None));
        assert_eq!(None, conv.find_remote_for(now, wants_gpu, &tried, Some(&gpu1)));
        assert_eq!(
            Some(&CapabilityValue::Bool(true)),
            conv.member(&gpu2).and_then(|m| m.capabilities.get("GPU"))
        );
    }

    #[test]
    fn new_observers_learn_current_members() {
        let (s1, s2) = (admin(1), admin(2));
        let mut conv = state(s1, Vec::new());
        conv.got_register(Duration::ZERO, register(&s2, Capabilities::new(), true, false));
        let effects = conv.add_observer(Duration::ZERO, observer());
        assert_eq!(1, notifications(&effects).len());
    }
}
