use super::*;

use crate::{
    actors::{
        Actor,
        ActorAddress,
        ActorClass,
        AddressKey,
        ClassRegistry,
        CreateRequest,
        ModuleProvider,
        SystemPath,
        UniquePath,
    },
    addressing::{AddressManager, PendingTransmits},
    convention::{ConventionEffect, HysteresisDelaySender, LocalConventionState},
    messaging::{Capabilities, CapabilityValue, Envelope, Message, PendingActor, Payload, Requirements},
    net::{channel::ChannelNetwork, Transport},
    sources::{SourceAuthority, SourceHash, SourceTable},
    supervision::Supervisor,
    timer::{earliest, Clock, ScheduledWakeup, SystemClock, WakeupSchedule},
    transmit::{CompletionTag, RateThrottle, TransmitIntent, Transmitter},
};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rustc_hash::{FxHashMap, FxHashSet};
use slog::{debug, info, warn};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use uuid::Uuid;

/// Steps without progress after which a blocking call on a stopped clock gives up.
const MAX_IDLE_STEPS: usize = 3;

/// The address table and outbound queues of one sending instance
///
/// Every actor has one, and so do the admin and the external endpoint.
pub(crate) struct Endpoint {
    pub(crate) addresses: AddressManager,
    pub(crate) outbound: PendingTransmits<TransmitIntent>,
}

impl Endpoint {
    pub(crate) fn new(owner: Uuid, admin: UniquePath, dead_timeout: Duration) -> Self {
        Endpoint {
            addresses: AddressManager::new(owner, admin).with_dead_timeout(Some(dead_timeout)),
            outbound: PendingTransmits::new(),
        }
    }
}

/// A hosted actor
pub(crate) struct ActorCell {
    pub(crate) path: UniquePath,
    pub(crate) parent: ActorAddress,
    pub(crate) class_name: String,
    pub(crate) class: Arc<dyn ActorClass>,
    pub(crate) requirements: Option<Requirements>,
    pub(crate) source_hash: Option<SourceHash>,
    pub(crate) global_name: Option<String>,
    pub(crate) actor: Box<dyn Actor>,
    pub(crate) supervisor: Supervisor,
    pub(crate) log: TroupeLogger,
}

/// A message that arrived for a local instance and waits to be handled
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) to: Uuid,
    pub(crate) sender: ActorAddress,
    pub(crate) message: Message,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CreationState {
    Pending,
    /// The requester was already told the creation failed.
    TimedOut,
}

/// A convention message held back by the hysteresis sender
#[derive(Debug)]
pub(crate) struct ConventionSend {
    pub(crate) to: UniquePath,
    pub(crate) message: Message,
    /// Includes the tags of older sends this one replaced.
    pub(crate) tags: Vec<CompletionTag>,
}

pub(crate) enum Authority {
    Unset,
    Local(Box<dyn SourceAuthority>),
    Actor(ActorAddress),
}

#[derive(Debug)]
pub(crate) enum ShutdownState {
    Running,
    Draining {
        deadline: Duration,
        requesters: Vec<ActorAddress>,
    },
    Done,
}

/// A troupe system hosts actors and takes part in a convention of systems
///
/// An `ActorSystem` is created from a [SystemConfig](SystemConfig) via its
/// [build](SystemConfig::build) function.
///
/// The system is a single event loop: nothing happens unless it is stepped, either
/// explicitly with [step](ActorSystem::step) and [run](ActorSystem::run), or implicitly
/// while waiting in [ask](ActorSystem::ask) and [listen](ActorSystem::listen).
/// Several systems may live in one process, they only ever meet through their transports.
///
/// Messages sent from outside, through the system or through a [SystemHandle](SystemHandle),
/// come from the system's *external address*, and answers to it are collected in an inbox.
///
/// # Example
///
/// ```
/// use troupe::prelude::*;
/// use std::time::Duration;
///
/// let mut system = SystemConfig::default().build().expect("system");
/// let admin = system.admin_address();
/// let reply = system
///     .ask(&admin, Message::QueryExists, Duration::from_secs(1))
///     .expect("ask");
/// assert!(matches!(reply.map(|r| r.message), Some(Message::QueryAck { .. })));
/// system.shutdown();
/// ```
pub struct ActorSystem {
    pub(crate) settings: RuntimeSettings,
    pub(crate) log: TroupeLogger,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) admin: UniquePath,
    pub(crate) external: Uuid,
    pub(crate) endpoints: FxHashMap<Uuid, Endpoint>,
    pub(crate) cells: FxHashMap<Uuid, ActorCell>,
    pub(crate) admin_children: Supervisor,
    pub(crate) transmitter: Transmitter,
    pub(crate) throttle: RateThrottle,
    pub(crate) delayed: WakeupSchedule<TransmitIntent>,
    pub(crate) local_done: Vec<TransmitIntent>,
    pub(crate) next_intent: u64,
    pub(crate) wakeups: WakeupSchedule<ScheduledWakeup<Option<Payload>>>,
    pub(crate) creations: FxHashMap<(Uuid, usize), CreationState>,
    pub(crate) creation_timeouts: WakeupSchedule<(Uuid, usize)>,
    pub(crate) failed_placeholders: FxHashSet<AddressKey>,
    pub(crate) mailbox: VecDeque<Delivery>,
    pub(crate) inbox: VecDeque<Envelope>,
    pub(crate) convention: LocalConventionState,
    pub(crate) hysteresis: HysteresisDelaySender<ConventionSend>,
    pub(crate) capabilities: Capabilities,
    pub(crate) classes: ClassRegistry,
    pub(crate) module_provider: Option<Arc<dyn ModuleProvider>>,
    pub(crate) sources: SourceTable<(PendingActor, ActorAddress)>,
    pub(crate) authority: Authority,
    pub(crate) global_names: FxHashMap<String, UniquePath>,
    pub(crate) nannies: FxHashMap<UniquePath, ActorAddress>,
    pub(crate) dead_letter_handlers: Vec<ActorAddress>,
    pub(crate) shutdown: ShutdownState,
    pub(crate) requests: Receiver<HandleRequest>,
    pub(crate) request_sender: Sender<HandleRequest>,
    pub(crate) shutdown_requested: Arc<AtomicBool>,
    pub(crate) next_tick: Duration,
}

fn default_transport(address: &str) -> Result<Box<dyn Transport>, SystemError> {
    let system: SystemPath = address.parse()?;
    let network = ChannelNetwork::process_wide();
    let transport = if system.port() == 0 {
        network.transport_on_free_port(system.protocol(), *system.address())
    } else {
        network.transport(system)
    };
    Ok(Box::new(transport))
}

impl ActorSystem {
    pub(crate) fn try_new(config: SystemConfig) -> Result<ActorSystem, SystemError> {
        let hocon = config.load_hocon()?;
        let settings = RuntimeSettings::from_hocon(&hocon)?;
        let SystemConfig {
            root_logger,
            clock,
            transport,
            classes,
            module_provider,
            source_authority,
            ..
        } = config;
        let root = root_logger.unwrap_or_else(|| default_logger().clone());
        let log = root.new(o!("system" => settings.label.clone()));
        let clock = clock.unwrap_or_else(SystemClock::shared);
        let transport = match transport {
            Some(transport) => transport,
            None => default_transport(&settings.address)?,
        };
        let admin = transport.local_system().admin();
        let mut candidates = Vec::with_capacity(settings.convention_addresses.len());
        for address in settings.convention_addresses.iter() {
            candidates.push(transport.address_from_string(address)?.system().admin());
        }
        let convention = LocalConventionState::new(
            admin.clone(),
            candidates,
            settings.capabilities.clone(),
            settings.convention.clone(),
            log.new(o!("component" => "convention")),
        );
        let external = Uuid::new_v4();
        let mut endpoints = FxHashMap::default();
        for owner in [Uuid::nil(), external].iter() {
            endpoints.insert(
                *owner,
                Endpoint::new(*owner, admin.clone(), settings.dead_address_timeout),
            );
        }
        let mut admin_children = Supervisor::new();
        admin_children.start();
        let (request_sender, requests) = unbounded();
        let now = clock.now();
        let mut system = ActorSystem {
            log: log.clone(),
            clock,
            transport,
            admin,
            external,
            endpoints,
            cells: FxHashMap::default(),
            admin_children,
            transmitter: Transmitter::new(
                settings.transmit.clone(),
                log.new(o!("component" => "transmit")),
            ),
            throttle: RateThrottle::new(
                settings.throttle_window,
                settings.throttle_max_rate,
                settings.throttle_threshold,
            ),
            delayed: WakeupSchedule::new(),
            local_done: Vec::new(),
            next_intent: 0,
            wakeups: WakeupSchedule::new(),
            creations: FxHashMap::default(),
            creation_timeouts: WakeupSchedule::new(),
            failed_placeholders: FxHashSet::default(),
            mailbox: VecDeque::new(),
            inbox: VecDeque::new(),
            convention,
            hysteresis: HysteresisDelaySender::new(settings.hysteresis.clone()),
            capabilities: settings.capabilities.clone(),
            classes,
            module_provider,
            sources: SourceTable::new(),
            authority: match source_authority {
                Some(authority) => Authority::Local(authority),
                None => Authority::Unset,
            },
            global_names: FxHashMap::default(),
            nannies: FxHashMap::default(),
            dead_letter_handlers: Vec::new(),
            shutdown: ShutdownState::Running,
            requests,
            request_sender,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            next_tick: now + settings.tick,
            settings,
        };
        info!(
            system.log,
            "Actor system started at {}", system.admin.system();
            "version" => system.settings.version.clone(),
        );
        let effects = system.convention.setup(now);
        system.apply_convention(effects);
        Ok(system)
    }

    /// The label given to this system in its config
    pub fn label(&self) -> &str {
        &self.settings.label
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }

    pub fn logger(&self) -> &TroupeLogger {
        &self.log
    }

    /// The current time of the system's clock
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// How long a shutdown waits for actors and transmits to finish
    pub fn drain_period(&self) -> Duration {
        self.settings.max_drain_period
    }

    /// The address under which other systems reach this one
    pub fn system_path(&self) -> &SystemPath {
        self.admin.system()
    }

    pub fn admin_address(&self) -> ActorAddress {
        ActorAddress::Unique(self.admin.clone())
    }

    /// The address messages sent from outside the system come from
    pub fn external_address(&self) -> ActorAddress {
        self.address_of(self.external)
    }

    /// The capabilities this system currently advertises
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Number of actors hosted right now
    pub fn actor_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if an actor lives at `address` on this system
    pub fn hosts(&self, address: &ActorAddress) -> bool {
        match address.unique() {
            Some(path) => self.is_local(&path) && self.cells.contains_key(path.id()),
            None => false,
        }
    }

    /// This system's view of the convention
    pub fn convention(&self) -> &LocalConventionState {
        &self.convention
    }

    /// Returns `true` if this system currently leads its convention
    pub fn is_leader(&self) -> bool {
        self.convention.is_leader(self.now())
    }

    /// A handle for use from other threads or signal handlers
    pub fn handle(&self) -> SystemHandle {
        SystemHandle::new(self.request_sender.clone(), self.shutdown_requested.clone())
    }

    /// Returns `true` once a shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        !matches!(self.shutdown, ShutdownState::Running)
    }

    /// Returns `true` once the shutdown has completed
    pub fn is_shut_down(&self) -> bool {
        matches!(self.shutdown, ShutdownState::Done)
    }

    /// Create a top-level actor
    ///
    /// Returns a placeholder address right away. Messages sent to it are held until the
    /// actor exists. If it cannot be created, a
    /// [ChildCreationFailed](Message::ChildCreationFailed) arrives in the inbox instead.
    pub fn create_actor(&mut self, request: CreateRequest) -> Result<ActorAddress, SystemError> {
        if self.is_shut_down() {
            return Err(SystemError::ShutDown);
        }
        let external = self.external;
        let placeholder = match self.endpoints.get_mut(&external) {
            Some(endpoint) => endpoint.addresses.create_local_address(),
            None => return Err(SystemError::ShutDown),
        };
        if let ActorAddress::Local(local) = &placeholder {
            self.request_creation(external, local.instance(), request);
        }
        Ok(placeholder)
    }

    /// Send `message` to `target` from the external address
    pub fn tell(&mut self, target: &ActorAddress, message: Message) -> Result<(), SystemError> {
        if self.is_shut_down() {
            return Err(SystemError::ShutDown);
        }
        let external = self.external;
        self.send_from(external, target, message, Vec::new());
        Ok(())
    }

    /// Send `message` to `target` and wait up to `timeout` for the next message to the external address
    pub fn ask(
        &mut self,
        target: &ActorAddress,
        message: Message,
        timeout: Duration,
    ) -> Result<Option<Envelope>, SystemError> {
        self.tell(target, message)?;
        Ok(self.listen(timeout))
    }

    /// Step the system until a message for the external address arrives or `timeout` passes
    ///
    /// On a clock that does not move by itself, gives up once nothing is left to do.
    pub fn listen(&mut self, timeout: Duration) -> Option<Envelope> {
        let deadline = self.now().saturating_add(timeout);
        let mut idle = 0;
        loop {
            if let Some(envelope) = self.inbox.pop_front() {
                return Some(envelope);
            }
            let now = self.now();
            if now >= deadline || self.is_shut_down() || idle >= MAX_IDLE_STEPS {
                return None;
            }
            let progressed = self.step(deadline - now);
            if progressed || self.now() > now {
                idle = 0;
            } else {
                idle += 1;
            }
        }
    }

    /// Everything that arrived for the external address so far
    pub fn drain_inbox(&mut self) -> Vec<Envelope> {
        self.inbox.drain(..).collect()
    }

    /// Set (`Some`) or remove (`None`) a capability
    ///
    /// The convention learns about the change, and every hosted actor whose
    /// requirements are no longer met is asked to exit.
    pub fn update_capability<S: Into<String>>(&mut self, name: S, value: Option<CapabilityValue>) {
        self.set_capability(name.into(), value);
    }

    /// Load a source blob, returning the hash it becomes available under
    ///
    /// The blob can only be used once the source authority validated it.
    pub fn load_source(&mut self, bytes: Bytes, info: Option<String>) -> Result<SourceHash, SystemError> {
        let hash = SourceHash::of(&bytes);
        let admin = self.admin_address();
        self.tell(&admin, Message::LoadSource { bytes, info })?;
        Ok(hash)
    }

    /// Unload a source blob and stop every actor created from it
    pub fn unload_source(&mut self, hash: &SourceHash) -> Result<(), SystemError> {
        let admin = self.admin_address();
        self.tell(&admin, Message::UnloadSource { hash: hash.clone() })
    }

    /// Have dead letters delivered to `handler`, or stop doing so
    pub fn register_dead_letter_handler(&mut self, handler: &ActorAddress, enable: bool) {
        self.set_dead_letter_handler(handler.clone(), enable);
    }

    /// Tell `observer` about convention members joining and leaving, or stop doing so
    pub fn notify_on_registration(&mut self, observer: &ActorAddress, enable: bool) {
        self.set_observer(observer.clone(), enable);
    }

    /// Register with the system at `remote`, which is expected to invite this one
    pub fn pre_register_system(&mut self, remote: &str) -> Result<(), SystemError> {
        let remote = self.transport.address_from_string(remote)?;
        let now = self.now();
        let effects = self.convention.pre_register(now, remote.system().admin());
        self.apply_convention(effects);
        Ok(())
    }

    /// Step the system for up to `max`
    ///
    /// Returns early once the system shut down, or when the clock stopped and nothing is left to do.
    pub fn run(&mut self, max: Duration) {
        let deadline = self.now().saturating_add(max);
        let mut idle = 0;
        while !self.is_shut_down() && idle < MAX_IDLE_STEPS {
            let now = self.now();
            if now >= deadline {
                break;
            }
            let progressed = self.step(deadline - now);
            if progressed || self.now() > now {
                idle = 0;
            } else {
                idle += 1;
            }
        }
    }

    /// Shut the system down and wait for it to finish
    ///
    /// Actors are asked to exit and outstanding transmits get up to the drain period to
    /// complete. Whatever is left after that is abandoned.
    pub fn shutdown(&mut self) {
        self.begin_shutdown(None);
        let limit = self.settings.max_drain_period + self.settings.tick;
        self.run(limit);
        if !self.is_shut_down() {
            self.complete_shutdown();
        }
    }

    /// The earliest time at which the system has timed work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        let mut next = Some(self.next_tick);
        next = earliest(next, self.transmitter.next_deadline());
        next = earliest(next, self.delayed.next_deadline());
        next = earliest(next, self.wakeups.next_deadline());
        next = earliest(next, self.creation_timeouts.next_deadline());
        next = earliest(next, self.hysteresis.next_deadline());
        if let ShutdownState::Draining { deadline, .. } = &self.shutdown {
            next = earliest(next, Some(*deadline));
        }
        next
    }

    /// Run one iteration of the event loop, waiting up to `max_wait` for network events
    ///
    /// Returns `true` if anything happened.
    pub fn step(&mut self, max_wait: Duration) -> bool {
        if self.is_shut_down() {
            return false;
        }
        let mut progressed = self.drain_requests();
        progressed |= self.run_timers();
        let now = self.now();
        let wait = if progressed || !self.mailbox.is_empty() || !self.local_done.is_empty() {
            Duration::ZERO
        } else {
            match self.next_deadline() {
                Some(deadline) => deadline.saturating_sub(now).min(max_wait),
                None => max_wait,
            }
        };
        let events = self.transport.poll(wait);
        progressed |= !events.is_empty();
        for event in events {
            self.handle_transport_event(event);
        }
        progressed |= self.process_completions();
        let batch: Vec<Delivery> = self.mailbox.drain(..).collect();
        progressed |= !batch.is_empty();
        for delivery in batch {
            self.deliver(delivery);
        }
        progressed |= self.process_completions();
        progressed |= self.check_shutdown();
        self.sweep_endpoints();
        progressed
    }

    fn drain_requests(&mut self) -> bool {
        let mut any = false;
        while let Ok(request) = self.requests.try_recv() {
            any = true;
            match request {
                HandleRequest::Tell { target, message } => {
                    let external = self.external;
                    self.send_from(external, &target, message, Vec::new());
                }
                HandleRequest::Shutdown => self.begin_shutdown(None),
            }
        }
        if self.shutdown_requested.load(Ordering::SeqCst) && !self.is_shutting_down() {
            any = true;
            self.begin_shutdown(None);
        }
        any
    }

    fn run_timers(&mut self) -> bool {
        let now = self.now();
        let mut fired = false;
        if self.transmitter.next_deadline().map_or(false, |d| d <= now) {
            fired = true;
            self.transmitter.check_timers(self.transport.as_mut(), now);
        }
        for intent in self.delayed.pop_due(now) {
            fired = true;
            self.launch(intent);
        }
        for wakeup in self.wakeups.pop_due(now) {
            fired = true;
            if self.cells.contains_key(&wakeup.target) {
                let me = self.address_of(wakeup.target);
                self.mailbox.push_back(Delivery {
                    to: wakeup.target,
                    sender: me,
                    message: Message::WakeupMessage {
                        delay: wakeup.delay,
                        payload: wakeup.payload,
                    },
                });
            }
        }
        for key in self.creation_timeouts.pop_due(now) {
            fired = true;
            self.creation_timed_out(key);
        }
        if self.hysteresis.next_deadline().map_or(false, |d| d <= now) {
            fired = true;
            for send in self.hysteresis.check_sends(now) {
                self.transmit_convention(send);
            }
        }
        if now >= self.next_tick {
            fired = true;
            self.next_tick = now + self.settings.tick;
            if !self.is_shutting_down() {
                let effects = self.convention.check(now);
                self.apply_convention(effects);
            }
            for endpoint in self.endpoints.values_mut() {
                endpoint.addresses.expire_dead(now);
            }
        }
        fired
    }

    /// Start shutting down on behalf of `requester`
    pub(crate) fn begin_shutdown(&mut self, requester: Option<ActorAddress>) {
        if let ShutdownState::Draining { requesters, .. } = &mut self.shutdown {
            requesters.extend(requester);
            return;
        }
        if self.is_shut_down() {
            if let Some(requester) = requester {
                self.reply_shutdown_completed(requester);
            }
            return;
        }
        info!(
            self.log,
            "Shutting down, draining for at most {:?}", self.settings.max_drain_period
        );
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown = ShutdownState::Draining {
            deadline: self.now() + self.settings.max_drain_period,
            requesters: requester.into_iter().collect(),
        };
        for effect in self.convention.shutdown() {
            match effect {
                ConventionEffect::Send { to, message, tag } => {
                    self.send_from(Uuid::nil(), &ActorAddress::Unique(to), message, tag.into_iter().collect())
                }
                other => self.apply_convention(vec![other]),
            }
        }
        let children: Vec<UniquePath> = self.admin_children.children().cloned().collect();
        for child in children {
            self.send_from(
                Uuid::nil(),
                &ActorAddress::Unique(child),
                Message::ActorExitRequest { recursive: true },
                Vec::new(),
            );
        }
    }

    fn check_shutdown(&mut self) -> bool {
        let deadline = match &self.shutdown {
            ShutdownState::Draining { deadline, .. } => *deadline,
            _ => return false,
        };
        let drained = self.cells.is_empty()
            && self.transmitter.in_flight() == 0
            && self.delayed.is_empty()
            && self.endpoints.values().all(|endpoint| endpoint.outbound.is_empty());
        if drained {
            self.complete_shutdown();
            true
        } else if self.now() >= deadline {
            warn!(
                self.log,
                "Drain period over with {} actors and {} transmits left",
                self.cells.len(),
                self.transmitter.in_flight()
            );
            self.complete_shutdown();
            true
        } else {
            false
        }
    }

    pub(crate) fn complete_shutdown(&mut self) {
        let requesters = match &mut self.shutdown {
            ShutdownState::Draining { requesters, .. } => std::mem::take(requesters),
            _ => Vec::new(),
        };
        for requester in requesters {
            self.reply_shutdown_completed(requester);
        }
        let mut left: Vec<TransmitIntent> = self.delayed.pop_due(Duration::MAX);
        for endpoint in self.endpoints.values_mut() {
            left.extend(endpoint.outbound.drain_waiting().into_iter().map(|(_, intent)| intent));
        }
        if !left.is_empty() {
            debug!(self.log, "Discarding {} unsent messages", left.len());
        }
        self.transmitter.abandon_all();
        self.shutdown = ShutdownState::Done;
        self.process_completions();
        self.mailbox.clear();
        self.cells.clear();
        info!(self.log, "Actor system shut down");
    }

    fn reply_shutdown_completed(&mut self, requester: ActorAddress) {
        if requester == self.external_address() {
            let admin = self.admin_address();
            self.inbox.push_back(Envelope {
                sender: admin,
                message: Message::SystemShutdownCompleted,
            });
        } else {
            self.send_from(
                Uuid::nil(),
                &requester,
                Message::SystemShutdownCompleted,
                Vec::new(),
            );
        }
    }

    fn sweep_endpoints(&mut self) {
        let external = self.external;
        let cells = &self.cells;
        self.endpoints.retain(|id, endpoint| {
            id.is_nil() || *id == external || cells.contains_key(id) || !endpoint.outbound.is_empty()
        });
    }

    pub(crate) fn path_of(&self, id: Uuid) -> UniquePath {
        UniquePath::new(self.admin.system().clone(), id)
    }

    pub(crate) fn address_of(&self, id: Uuid) -> ActorAddress {
        ActorAddress::Unique(self.path_of(id))
    }

    pub(crate) fn is_local(&self, path: &UniquePath) -> bool {
        path.system() == self.admin.system()
    }

    /// Returns `true` if messages for `id` can be handled here
    pub(crate) fn is_hosted(&self, id: &Uuid) -> bool {
        id.is_nil() || *id == self.external || self.cells.contains_key(id)
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActorSystem{{label={}, address={}, actors={}, shutdown={:?}}}",
            self.settings.label,
            self.admin.system(),
            self.cells.len(),
            self.shutdown
        )
    }
}
