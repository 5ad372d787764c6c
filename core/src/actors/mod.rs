//! Actors and the context they handle messages in.
//!
//! An [Actor](Actor) sees one message at a time through [receive](Actor::receive).
//! Everything it wants to happen, sends, child creations, wakeups, its own exit,
//! is recorded on the [ActorContext](ActorContext) and carried out by the system
//! once the handler returns successfully.

use crate::{
    addressing::AddressManager,
    messaging::{Capabilities, Message, Payload, PayloadError, PendingActorError, Requirements},
    sources::SourceHash,
    TroupeLogger,
};
use std::{error::Error, fmt, time::Duration};

mod address;
mod class;

pub use address::*;
pub use class::*;

/// What the handler wants to happen to the actor afterwards
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handled {
    Ok,
    /// Exit right away, as if an `ActorExitRequest` had arrived.
    DieNow,
}

/// A failed message handler
#[derive(Debug, Clone, PartialEq)]
pub enum ActorError {
    /// The message could not be handled, it is retried once.
    Handler(String),
    /// A payload could not be decoded, handled like [Handler](ActorError::Handler).
    Payload(PayloadError),
    /// The actor cannot continue and is stopped.
    Fatal(String),
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorError::Handler(reason) => write!(f, "Handler failed: {}", reason),
            ActorError::Payload(e) => write!(f, "{}", e),
            ActorError::Fatal(reason) => write!(f, "Actor failed fatally: {}", reason),
        }
    }
}

impl Error for ActorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ActorError::Payload(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PayloadError> for ActorError {
    fn from(e: PayloadError) -> Self {
        ActorError::Payload(e)
    }
}

/// A unit of computation that communicates only through messages
pub trait Actor {
    /// Handle a single message from `sender`
    fn receive(
        &mut self,
        ctx: &mut ActorContext<'_>,
        sender: &ActorAddress,
        msg: Message,
    ) -> Result<Handled, ActorError>;
}

/// What to create and where it may run
#[derive(Clone, Debug, PartialEq)]
pub struct CreateRequest {
    pub class_name: String,
    pub requirements: Option<Requirements>,
    /// A system-wide name, the first actor created under it is reused.
    pub global_name: Option<String>,
    /// Create the class from a loaded source instead of the local registry.
    pub source_hash: Option<SourceHash>,
}

impl CreateRequest {
    pub fn new<S: Into<String>>(class_name: S) -> Self {
        CreateRequest {
            class_name: class_name.into(),
            requirements: None,
            global_name: None,
            source_hash: None,
        }
    }

    pub fn requiring(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn global<S: Into<String>>(mut self, name: S) -> Self {
        self.global_name = Some(name.into());
        self
    }

    pub fn from_source(mut self, hash: SourceHash) -> Self {
        self.source_hash = Some(hash);
        self
    }
}

/// Something a handler asked for
#[derive(Clone, Debug)]
pub(crate) enum Effect {
    Send { target: ActorAddress, message: Message },
    Create { instance: usize, request: CreateRequest },
    Wakeup { delay: Duration, payload: Option<Payload> },
    Exit,
}

/// The view an actor has of itself and its system while handling a message
pub struct ActorContext<'a> {
    me: &'a UniquePath,
    parent: &'a ActorAddress,
    class_name: &'a str,
    addresses: &'a mut AddressManager,
    capabilities: &'a Capabilities,
    log: &'a TroupeLogger,
    now: Duration,
    shutting_down: bool,
    effects: Vec<Effect>,
}

impl<'a> ActorContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        me: &'a UniquePath,
        parent: &'a ActorAddress,
        class_name: &'a str,
        addresses: &'a mut AddressManager,
        capabilities: &'a Capabilities,
        log: &'a TroupeLogger,
        now: Duration,
        shutting_down: bool,
    ) -> Self {
        ActorContext {
            me,
            parent,
            class_name,
            addresses,
            capabilities,
            log,
            now,
            shutting_down,
            effects: Vec::new(),
        }
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    pub fn my_address(&self) -> ActorAddress {
        ActorAddress::Unique(self.me.clone())
    }

    pub fn parent(&self) -> &ActorAddress {
        self.parent
    }

    pub fn class_name(&self) -> &str {
        self.class_name
    }

    /// The capabilities of the system hosting this actor
    pub fn capabilities(&self) -> &Capabilities {
        self.capabilities
    }

    pub fn log(&self) -> &TroupeLogger {
        self.log
    }

    /// The system clock at the time the message is handled
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Send `msg` to `target`
    ///
    /// Placeholders for children that are not created yet are fine, the message is
    /// held until the child's location is known.
    pub fn send(&mut self, target: &ActorAddress, msg: Message) {
        self.effects.push(Effect::Send {
            target: target.clone(),
            message: msg,
        });
    }

    /// Send application data to `target`
    pub fn tell(&mut self, target: &ActorAddress, payload: Payload) {
        self.send(target, Message::User(payload));
    }

    /// Create a child actor
    ///
    /// Returns a placeholder that can be used right away.
    /// If the child cannot be created, a
    /// [ChildCreationFailed](Message::ChildCreationFailed) arrives later.
    pub fn create_actor(&mut self, request: CreateRequest) -> Result<ActorAddress, PendingActorError> {
        if self.shutting_down {
            return Err(PendingActorError::ShuttingDown);
        }
        let placeholder = self.addresses.create_local_address();
        if let ActorAddress::Local(local) = &placeholder {
            self.effects.push(Effect::Create {
                instance: local.instance(),
                request,
            });
        }
        Ok(placeholder)
    }

    /// Have a [WakeupMessage](Message::WakeupMessage) delivered after `delay`
    pub fn wakeup_after(&mut self, delay: Duration, payload: Option<Payload>) {
        self.effects.push(Effect::Wakeup { delay, payload });
    }

    /// Exit once this handler returns, children first
    pub fn exit(&mut self) {
        self.effects.push(Effect::Exit);
    }

    /// Returns `true` if `a` and `b` denote the same actor, as far as this actor can tell
    pub fn same_actor(&self, a: &ActorAddress, b: &ActorAddress) -> bool {
        match (self.addresses.export(a), self.addresses.export(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    }
}
