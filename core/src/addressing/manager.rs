use crate::{
    actors::{ActorAddress, LocalAddress, UniquePath},
    messaging::Message,
    timer::ExpirationTimer,
};
use arc_swap::ArcSwapOption;
use rustc_hash::FxHashMap;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// The result of [prepare_send](AddressManager::prepare_send)
#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// The target is a placeholder that is not resolved yet, hold the message.
    Unresolved(Message),
    /// Transmit the message to the given address.
    ///
    /// For dead targets the address is the local admin and the message a
    /// [DeadEnvelope](Message::DeadEnvelope).
    Ready(UniquePath, Message),
    /// The message is a dead-letter notice for a dead target, discard it.
    Drop,
}

/// Maps the placeholders an actor hands out to the addresses they resolve to
///
/// Owned by exactly one actor (or the admin). Slot indices are stable for the lifetime
/// of the owner and a slot, once bound, is never rebound to a different address.
pub struct AddressManager {
    owner: Uuid,
    admin: UniquePath,
    slots: Vec<Arc<ArcSwapOption<UniquePath>>>,
    known: FxHashMap<UniquePath, usize>,
    dead: FxHashMap<UniquePath, ExpirationTimer>,
    dead_timeout: Option<Duration>,
}

impl AddressManager {
    /// Create a manager for the actor with id `owner`, living on the system whose admin is `admin`
    pub fn new(owner: Uuid, admin: UniquePath) -> Self {
        AddressManager {
            owner,
            admin,
            slots: Vec::new(),
            known: FxHashMap::default(),
            dead: FxHashMap::default(),
            dead_timeout: None,
        }
    }

    /// Forget dead marks after `timeout` without fresh evidence
    ///
    /// `None` keeps dead marks until they are explicitly cleared.
    pub fn with_dead_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dead_timeout = timeout;
        self
    }

    pub fn owner(&self) -> &Uuid {
        &self.owner
    }

    /// Allocate a new placeholder slot
    pub fn create_local_address(&mut self) -> ActorAddress {
        let instance = self.slots.len();
        let slot = Arc::new(ArcSwapOption::empty());
        self.slots.push(slot.clone());
        ActorAddress::Local(LocalAddress::new(self.owner, instance, slot))
    }

    /// The placeholder for slot `instance`, if it exists
    pub fn placeholder(&self, instance: usize) -> Option<ActorAddress> {
        self.slots.get(instance).map(|slot| {
            ActorAddress::Local(LocalAddress::new(self.owner, instance, slot.clone()))
        })
    }

    /// Bind slot `instance` to `resolved`
    ///
    /// Only takes effect if `owner` is this manager's owner.
    /// A slot that is already bound to another address keeps its binding,
    /// while a repeated binding to the same address replaces it in place.
    /// Returns `true` if the binding is in place afterwards.
    pub fn associate(&mut self, owner: &Uuid, instance: usize, resolved: UniquePath) -> bool {
        if *owner != self.owner {
            return false;
        }
        let slot = match self.slots.get(instance) {
            Some(slot) => slot,
            None => return false,
        };
        if let Some(existing) = slot.load_full() {
            if *existing != resolved {
                return false;
            }
        }
        slot.store(Some(Arc::new(resolved.clone())));
        self.dead.remove(&resolved);
        self.known.insert(resolved, instance);
        true
    }

    /// Note an address received from elsewhere
    ///
    /// Receiving from an address proves it is alive, so any dead mark is cleared.
    /// Returns the placeholder this manager uses for the same actor, if there is one,
    /// otherwise the address itself.
    pub fn import_addr(&mut self, addr: &ActorAddress) -> ActorAddress {
        match addr.unique() {
            Some(path) => {
                self.dead.remove(&path);
                match self.known.get(&path).and_then(|i| self.placeholder(*i)) {
                    Some(alias) => alias,
                    None => addr.clone(),
                }
            }
            None => addr.clone(),
        }
    }

    /// The real address behind `addr`, or `None` if it is an unresolved placeholder
    pub fn export(&self, addr: &ActorAddress) -> Option<UniquePath> {
        match addr {
            ActorAddress::Unique(path) => Some(path.clone()),
            ActorAddress::Local(local) if *local.owner() == self.owner => self
                .slots
                .get(local.instance())
                .and_then(|slot| slot.load_full())
                .map(|p| (*p).clone()),
            ActorAddress::Local(local) => local.resolved(),
        }
    }

    /// Decide where a message for `target` actually goes
    pub fn prepare_send(&mut self, target: &ActorAddress, msg: Message, now: Duration) -> Prepared {
        let path = match self.export(target) {
            Some(path) => path,
            None => return Prepared::Unresolved(msg),
        };
        if self.is_dead(&path, now) {
            if msg.is_dead_letter_notice() {
                Prepared::Drop
            } else {
                Prepared::Ready(
                    self.admin.clone(),
                    Message::DeadEnvelope {
                        dead_address: ActorAddress::Unique(path),
                        message: Box::new(msg),
                    },
                )
            }
        } else {
            Prepared::Ready(path, msg)
        }
    }

    /// Record that `addr` is known to be dead
    pub fn mark_dead(&mut self, addr: &ActorAddress, now: Duration) {
        if let Some(path) = self.export(addr) {
            let expiry = ExpirationTimer::from_now(now, self.dead_timeout);
            self.dead.insert(path, expiry);
        }
    }

    /// Remove the dead mark for `addr`
    pub fn clear_dead(&mut self, addr: &ActorAddress) {
        if let Some(path) = self.export(addr) {
            self.dead.remove(&path);
        }
    }

    /// Returns `true` if `path` is currently marked dead
    pub fn is_dead(&mut self, path: &UniquePath, now: Duration) -> bool {
        match self.dead.get(path) {
            Some(expiry) if expiry.is_expired(now) => {
                self.dead.remove(path);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Drop every dead mark whose quiescent timeout has passed
    pub fn expire_dead(&mut self, now: Duration) {
        self.dead.retain(|_, expiry| !expiry.is_expired(now));
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::SystemPath;

    fn system() -> SystemPath {
        "tcp://127.0.0.1:1900".parse().expect("system")
    }

    fn manager() -> AddressManager {
        AddressManager::new(Uuid::new_v4(), system().admin())
    }

    fn remote() -> UniquePath {
        UniquePath::new("tcp://10.0.0.2:1900".parse().expect("system"), Uuid::new_v4())
    }

    #[test]
    fn placeholder_round_trip() {
        let mut am = manager();
        let owner = *am.owner();
        let placeholder = am.create_local_address();
        assert_eq!(None, am.export(&placeholder));
        let real = remote();
        assert!(am.associate(&owner, 0, real.clone()));
        assert_eq!(Some(real.clone()), am.export(&placeholder));
        assert_eq!(placeholder, ActorAddress::Unique(real));
    }

    #[test]
    fn slots_are_stable_and_sequential() {
        let mut am = manager();
        let a = am.create_local_address();
        let b = am.create_local_address();
        match (&a, &b) {
            (ActorAddress::Local(a), ActorAddress::Local(b)) => {
                assert_eq!(0, a.instance());
                assert_eq!(1, b.instance());
            }
            _ => panic!("expected placeholders"),
        }
        assert_ne!(a, b);
        assert_eq!(2, am.slot_count());
    }

    #[test]
    fn foreign_owner_cannot_associate() {
        let mut am = manager();
        let placeholder = am.create_local_address();
        assert!(!am.associate(&Uuid::new_v4(), 0, remote()));
        assert_eq!(None, am.export(&placeholder));
    }

    #[test]
    fn bindings_are_never_redirected() {
        let mut am = manager();
        let owner = *am.owner();
        let placeholder = am.create_local_address();
        let first = remote();
        assert!(am.associate(&owner, 0, first.clone()));
        assert!(!am.associate(&owner, 0, remote()));
        let hop: SystemPath = "tcp://10.0.0.3:1900".parse().expect("hop");
        assert!(am.associate(&owner, 0, first.clone().via(vec![hop])));
        assert_eq!(Some(first), am.export(&placeholder));
    }

    #[test]
    fn unresolved_sends_are_held() {
        let mut am = manager();
        let placeholder = am.create_local_address();
        let msg = Message::text("t", "x");
        assert_eq!(
            Prepared::Unresolved(msg.clone()),
            am.prepare_send(&placeholder, msg, Duration::ZERO)
        );
    }

    #[test]
    fn dead_targets_become_dead_envelopes() {
        let mut am = manager();
        let dead = ActorAddress::Unique(remote());
        am.mark_dead(&dead, Duration::ZERO);
        match am.prepare_send(&dead, Message::text("t", "x"), Duration::ZERO) {
            Prepared::Ready(to, Message::DeadEnvelope { dead_address, .. }) => {
                assert_eq!(system().admin(), to);
                assert_eq!(dead, dead_address);
            }
            other => panic!("Unexpected preparation: {:?}", other),
        }
    }

    #[test]
    fn dead_letter_notices_to_dead_targets_are_dropped() {
        let mut am = manager();
        let dead = ActorAddress::Unique(remote());
        am.mark_dead(&dead, Duration::ZERO);
        let exited = Message::ChildActorExited {
            child: dead.clone(),
        };
        assert_eq!(Prepared::Drop, am.prepare_send(&dead, exited, Duration::ZERO));
        let envelope = Message::DeadEnvelope {
            dead_address: dead.clone(),
            message: Box::new(Message::Invite),
        };
        assert_eq!(Prepared::Drop, am.prepare_send(&dead, envelope, Duration::ZERO));
    }

    #[test]
    fn import_clears_dead_and_returns_alias() {
        let mut am = manager();
        let owner = *am.owner();
        let placeholder = am.create_local_address();
        let real = remote();
        am.associate(&owner, 0, real.clone());
        let addr = ActorAddress::Unique(real.clone());
        am.mark_dead(&addr, Duration::ZERO);
        assert!(am.is_dead(&real, Duration::ZERO));
        let alias = am.import_addr(&addr);
        assert!(alias.is_placeholder());
        assert_eq!(placeholder, alias);
        assert!(!am.is_dead(&real, Duration::ZERO));
    }

    #[test]
    fn dead_marks_expire_when_quiescent() {
        let mut am = manager().with_dead_timeout(Some(Duration::from_secs(10)));
        let dead = ActorAddress::Unique(remote());
        am.mark_dead(&dead, Duration::from_secs(1));
        let path = dead.unique().expect("resolved");
        assert!(am.is_dead(&path, Duration::from_secs(5)));
        assert!(!am.is_dead(&path, Duration::from_secs(11)));
        am.mark_dead(&dead, Duration::from_secs(20));
        am.clear_dead(&dead);
        assert!(!am.is_dead(&path, Duration::from_secs(20)));
    }
}
