//! Delivery of individual messages over a [Transport](crate::net::Transport).
//!
//! Each message handed to the network becomes a [TransmitIntent](TransmitIntent) that the
//! [Transmitter](Transmitter) drives through connect, send and acknowledgement, backing
//! off and retrying on transient failures until it is sent, refused or out of budget.

use crate::{
    actors::{ActorAddress, SystemPath, UniquePath},
    addressing::IntentId,
    messaging::{Message, PendingActor, WireFrame},
    net::{AckStatus, ConnectionId, Transport, TransportError, TransportEvent},
    timer::ExpirationTimer,
    TroupeLogger,
};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use slog::{debug, trace, warn};
use std::{collections::BTreeMap, time::Duration};
use uuid::Uuid;

mod backoff;
mod throttle;

pub use backoff::RetryBackoff;
pub use throttle::RateThrottle;

/// How a transmit ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// Acknowledged by the receiving system
    Sent,
    /// Retries or time ran out
    Failed,
    /// The target is gone and will not come back
    DeadTarget,
    /// The message could not be encoded, or the receiver could not decode it
    BadPacket,
}

impl SendStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SendStatus::Sent)
    }
}

/// Follow-up work to run when a transmit completes
#[derive(Clone, Debug, PartialEq)]
pub enum CompletionTag {
    /// A registration sent to a convention peer.
    ConventionRegistration { peer: UniquePath },
    /// An invitation sent to a pre-registered peer.
    ConventionInvite { peer: UniquePath },
    /// A creation request forwarded to another system's admin.
    ForwardedCreation {
        request: PendingActor,
        candidate: UniquePath,
    },
}

/// Where an intent is in its life
///
/// There is no cleanup stage. `TransmitIntent::complete` moves straight to `Done`,
/// and the system releases the queue slot and runs the tags when it processes the
/// finished intent in `completed`.
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    /// Waiting in the pending-transmit queue or for resolution
    Queued,
    Connect,
    SendData { conn: ConnectionId },
    AwaitAck {
        conn: ConnectionId,
        seq: u64,
        deadline: Duration,
    },
    /// Backing off until `until`, then reconnecting
    Retry { until: Duration },
    Done(SendStatus),
}

/// One attempt to get a message to its target
#[derive(Clone, Debug)]
pub struct TransmitIntent {
    id: IntentId,
    /// The instance that sent the message.
    pub owner: Uuid,
    pub sender: ActorAddress,
    /// The target as the sender named it, possibly a placeholder.
    pub target: ActorAddress,
    pub message: Message,
    destination: Option<UniquePath>,
    expiry: ExpirationTimer,
    attempts: usize,
    stage: Stage,
    backoff: RetryBackoff,
    frame: Option<Bytes>,
    tags: Vec<CompletionTag>,
}

impl TransmitIntent {
    pub fn new(
        id: IntentId,
        owner: Uuid,
        sender: ActorAddress,
        target: ActorAddress,
        message: Message,
        expiry: ExpirationTimer,
    ) -> Self {
        TransmitIntent {
            id,
            owner,
            sender,
            target,
            message,
            destination: None,
            expiry,
            attempts: 0,
            stage: Stage::Queued,
            backoff: RetryBackoff::default(),
            frame: None,
            tags: Vec::new(),
        }
    }

    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_tag(mut self, tag: CompletionTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn id(&self) -> IntentId {
        self.id
    }

    /// The resolved address the message is actually sent to
    pub fn destination(&self) -> Option<&UniquePath> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: UniquePath) {
        if self.destination.as_ref() != Some(&destination) {
            self.frame = None;
        }
        self.destination = Some(destination);
    }

    pub fn expiry(&self) -> &ExpirationTimer {
        &self.expiry
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// The final status, once completed
    pub fn status(&self) -> Option<SendStatus> {
        match self.stage {
            Stage::Done(status) => Some(status),
            _ => None,
        }
    }

    pub fn tags(&self) -> &[CompletionTag] {
        &self.tags
    }

    pub fn take_tags(&mut self) -> Vec<CompletionTag> {
        std::mem::take(&mut self.tags)
    }

    /// Finish the intent
    ///
    /// Only the first call has any effect, it returns `true`.
    pub fn complete(&mut self, status: SendStatus) -> bool {
        if let Stage::Done(_) = self.stage {
            false
        } else {
            self.stage = Stage::Done(status);
            true
        }
    }

    fn frame(&mut self) -> Result<Bytes, SendStatus> {
        if let Some(frame) = self.frame.as_ref() {
            return Ok(frame.clone());
        }
        let target = self.destination.as_ref().ok_or(SendStatus::Failed)?.direct();
        let frame = WireFrame {
            sender: self.sender.clone(),
            target,
            message: self.message.clone(),
        };
        let bytes = frame.encode().map_err(|_| SendStatus::BadPacket)?;
        self.frame = Some(bytes.clone());
        Ok(bytes)
    }
}

/// Limits for the transmit state machine
#[derive(Clone, Debug, PartialEq)]
pub struct TransmitSettings {
    pub max_retries: usize,
    pub timeout: Duration,
    pub ack_timeout: Duration,
    pub backoff_min: Duration,
    pub backoff_factor: f64,
    pub backoff_max: Duration,
}

impl TransmitSettings {
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.backoff_min, self.backoff_factor, self.backoff_max)
    }
}

impl Default for TransmitSettings {
    fn default() -> Self {
        TransmitSettings {
            max_retries: 20,
            timeout: Duration::from_secs(300),
            ack_timeout: Duration::from_secs(10),
            backoff_min: Duration::from_millis(20),
            backoff_factor: 1.7,
            backoff_max: Duration::from_millis(7_300),
        }
    }
}

/// Drives transmit intents over a transport
pub struct Transmitter {
    settings: TransmitSettings,
    log: TroupeLogger,
    connections: FxHashMap<SystemPath, ConnectionId>,
    active: BTreeMap<IntentId, TransmitIntent>,
    acks: FxHashMap<(ConnectionId, u64), IntentId>,
    next_seq: u64,
    completed: Vec<TransmitIntent>,
}

impl Transmitter {
    pub fn new(settings: TransmitSettings, log: TroupeLogger) -> Self {
        Transmitter {
            settings,
            log,
            connections: FxHashMap::default(),
            active: BTreeMap::new(),
            acks: FxHashMap::default(),
            next_seq: 0,
            completed: Vec::new(),
        }
    }

    pub fn settings(&self) -> &TransmitSettings {
        &self.settings
    }

    /// Start transmitting a resolved intent
    pub fn submit(&mut self, transport: &mut dyn Transport, mut intent: TransmitIntent, now: Duration) {
        if intent.destination.is_none() {
            warn!(self.log, "Dropping intent {:?} without destination", intent.id);
            self.finish(intent, SendStatus::Failed);
            return;
        }
        intent.stage = Stage::Connect;
        self.drive(transport, intent, now);
    }

    fn drive(&mut self, transport: &mut dyn Transport, mut intent: TransmitIntent, now: Duration) {
        loop {
            match intent.stage.clone() {
                Stage::Connect => {
                    if intent.expiry.is_expired(now) {
                        self.finish(intent, SendStatus::Failed);
                        return;
                    }
                    let system = match intent.destination.as_ref() {
                        Some(dest) => dest.system().clone(),
                        None => {
                            self.finish(intent, SendStatus::Failed);
                            return;
                        }
                    };
                    if let Some(conn) = self.connections.get(&system) {
                        intent.stage = Stage::SendData { conn: *conn };
                        continue;
                    }
                    match transport.connect(&system) {
                        Ok(conn) => {
                            trace!(self.log, "Connected to {} as {:?}", system, conn);
                            self.connections.insert(system, conn);
                            intent.stage = Stage::SendData { conn };
                        }
                        Err(TransportError::Refused) => {
                            debug!(self.log, "Connection to {} refused", system);
                            self.finish(intent, SendStatus::DeadTarget);
                            return;
                        }
                        Err(e) => {
                            trace!(self.log, "Connecting to {} failed: {}", system, e);
                            self.retry(intent, now);
                            return;
                        }
                    }
                }
                Stage::SendData { conn } => {
                    let frame = match intent.frame() {
                        Ok(frame) => frame,
                        Err(status) => {
                            warn!(
                                self.log,
                                "Could not encode {} for {}", intent.message.kind(), intent.target
                            );
                            self.finish(intent, status);
                            return;
                        }
                    };
                    self.next_seq += 1;
                    let seq = self.next_seq;
                    match transport.send(conn, seq, frame) {
                        Ok(()) => {
                            let ack_deadline = now.saturating_add(self.settings.ack_timeout);
                            let deadline = match intent.expiry.deadline() {
                                Some(expiry) => ack_deadline.min(expiry),
                                None => ack_deadline,
                            };
                            intent.stage = Stage::AwaitAck {
                                conn,
                                seq,
                                deadline,
                            };
                            self.acks.insert((conn, seq), intent.id);
                            self.active.insert(intent.id, intent);
                            return;
                        }
                        Err(TransportError::Refused) => {
                            self.forget_connection(conn);
                            self.finish(intent, SendStatus::DeadTarget);
                            return;
                        }
                        Err(TransportError::Reset) => {
                            self.forget_connection(conn);
                            self.retry(intent, now);
                            return;
                        }
                        Err(TransportError::WouldBlock) => {
                            self.retry(intent, now);
                            return;
                        }
                    }
                }
                _ => {
                    self.active.insert(intent.id, intent);
                    return;
                }
            }
        }
    }

    fn retry(&mut self, mut intent: TransmitIntent, now: Duration) {
        intent.attempts += 1;
        if intent.attempts > self.settings.max_retries || intent.expiry.is_expired(now) {
            debug!(
                self.log,
                "Giving up on {} to {} after {} attempts",
                intent.message.kind(),
                intent.target,
                intent.attempts
            );
            self.finish(intent, SendStatus::Failed);
            return;
        }
        let wait = intent.backoff.next_interval();
        let mut until = now.saturating_add(wait);
        if let Some(expiry) = intent.expiry.deadline() {
            until = until.min(expiry);
        }
        trace!(
            self.log,
            "Retrying {} to {} in {:?}",
            intent.message.kind(),
            intent.target,
            wait
        );
        intent.stage = Stage::Retry { until };
        self.active.insert(intent.id, intent);
    }

    fn finish(&mut self, mut intent: TransmitIntent, status: SendStatus) {
        if intent.complete(status) {
            self.completed.push(intent);
        }
    }

    fn forget_connection(&mut self, conn: ConnectionId) {
        self.connections.retain(|_, c| *c != conn);
    }

    /// Feed an acknowledgement or connection event to the state machine
    ///
    /// Received frames are not handled here and are ignored.
    pub fn handle_event(&mut self, transport: &mut dyn Transport, event: TransportEvent, now: Duration) {
        match event {
            TransportEvent::Acked { conn, seq, status } => {
                if let Some(intent) = self.take_awaiting(conn, seq) {
                    let status = match status {
                        AckStatus::Ok => SendStatus::Sent,
                        AckStatus::BadPacket => SendStatus::BadPacket,
                        AckStatus::DeadTarget => SendStatus::DeadTarget,
                    };
                    self.finish(intent, status);
                }
            }
            TransportEvent::Garbled { conn, seq } => {
                if let Some(intent) = self.take_awaiting(conn, seq) {
                    debug!(self.log, "Garbled acknowledgement for {:?}", intent.id);
                    self.retry(intent, now);
                }
            }
            TransportEvent::Closed { conn } => {
                self.forget_connection(conn);
                let lost: Vec<(ConnectionId, u64)> = self
                    .acks
                    .keys()
                    .filter(|(c, _)| *c == conn)
                    .copied()
                    .collect();
                for (c, seq) in lost {
                    if let Some(intent) = self.take_awaiting(c, seq) {
                        self.retry(intent, now);
                    }
                }
                transport.disconnect(conn);
            }
            TransportEvent::Received { .. } => (),
        }
    }

    fn take_awaiting(&mut self, conn: ConnectionId, seq: u64) -> Option<TransmitIntent> {
        let id = self.acks.remove(&(conn, seq))?;
        self.active.remove(&id)
    }

    /// Restart intents whose backoff elapsed and retry those whose ack is overdue
    pub fn check_timers(&mut self, transport: &mut dyn Transport, now: Duration) {
        let due: Vec<IntentId> = self
            .active
            .iter()
            .filter(|(_, intent)| match intent.stage {
                Stage::Retry { until } => until <= now,
                Stage::AwaitAck { deadline, .. } => deadline <= now,
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            let mut intent = match self.active.remove(&id) {
                Some(intent) => intent,
                None => continue,
            };
            match intent.stage {
                Stage::AwaitAck { conn, seq, .. } => {
                    self.acks.remove(&(conn, seq));
                    debug!(self.log, "No acknowledgement for {:?} on {:?}", id, conn);
                    self.retry(intent, now);
                }
                _ => {
                    intent.stage = Stage::Connect;
                    self.drive(transport, intent, now);
                }
            }
        }
    }

    /// The earliest time at which [check_timers](Transmitter::check_timers) has work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        self.active
            .values()
            .filter_map(|intent| match intent.stage {
                Stage::Retry { until } => Some(until),
                Stage::AwaitAck { deadline, .. } => Some(deadline),
                _ => None,
            })
            .min()
    }

    /// Intents that finished since the last call, in completion order
    pub fn take_completed(&mut self) -> Vec<TransmitIntent> {
        std::mem::take(&mut self.completed)
    }

    /// Number of intents currently between submission and completion
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Drop the cached connection to `system`
    pub fn reset_connection(&mut self, transport: &mut dyn Transport, system: &SystemPath) {
        if let Some(conn) = self.connections.remove(system) {
            transport.disconnect(conn);
        }
    }

    /// Fail every active intent, used when a drain period runs out
    pub fn abandon_all(&mut self) {
        self.acks.clear();
        let active = std::mem::take(&mut self.active);
        for (_, intent) in active {
            self.finish(intent, SendStatus::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{net::simulation::SimulationNetwork, runtime::default_logger};

    struct Fixture {
        network: SimulationNetwork,
        local: SystemPath,
        remote: SystemPath,
        transmitter: Transmitter,
        next_id: u64,
    }

    impl Fixture {
        fn new(settings: TransmitSettings) -> Self {
            Fixture {
                network: SimulationNetwork::new(),
                local: "tcp://10.0.0.1:1900".parse().expect("system"),
                remote: "tcp://10.0.0.2:1900".parse().expect("system"),
                transmitter: Transmitter::new(settings, default_logger().clone()),
                next_id: 0,
            }
        }

        fn intent(&mut self, now: Duration) -> TransmitIntent {
            self.next_id += 1;
            let target = UniquePath::new(self.remote.clone(), Uuid::new_v4());
            let mut intent = TransmitIntent::new(
                IntentId(self.next_id),
                Uuid::nil(),
                ActorAddress::Unique(self.local.admin()),
                ActorAddress::Unique(target.clone()),
                Message::text("t", "x"),
                ExpirationTimer::after(now, self.transmitter.settings().timeout),
            )
            .with_backoff(self.transmitter.settings().backoff());
            intent.set_destination(target);
            intent
        }

        fn ack_all(&self, status: AckStatus) {
            let mut remote = self.network.transport(self.remote.clone());
            for event in remote.poll(Duration::ZERO) {
                if let TransportEvent::Received { conn, seq, .. } = event {
                    remote.acknowledge(conn, seq, status);
                }
            }
        }

        fn pump(&mut self, transport: &mut dyn Transport, now: Duration) {
            for event in transport.poll(Duration::ZERO) {
                self.transmitter.handle_event(transport, event, now);
            }
        }
    }

    #[test]
    fn sent_only_after_acknowledgement() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        assert!(fx.transmitter.take_completed().is_empty());
        assert_eq!(1, fx.transmitter.in_flight());
        fx.ack_all(AckStatus::Ok);
        fx.pump(&mut local, Duration::ZERO);
        let done = fx.transmitter.take_completed();
        assert_eq!(1, done.len());
        assert_eq!(Some(SendStatus::Sent), done[0].status());
    }

    #[test]
    fn connections_are_reused() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        for _ in 0..2 {
            let intent = fx.intent(Duration::ZERO);
            fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        }
        let sent = fx.network.sent();
        assert_eq!(2, sent.len());
        assert_eq!(sent[0].conn, sent[1].conn);
    }

    #[test]
    fn refusal_is_a_dead_target_without_retries() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        fx.network.set_down(&fx.remote, true);
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        let done = fx.transmitter.take_completed();
        assert_eq!(Some(SendStatus::DeadTarget), done[0].status());
        assert_eq!(0, done[0].attempts());
    }

    #[test]
    fn would_block_backs_off_and_recovers() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        fx.network.set_blocked(&fx.remote, true);
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        assert_eq!(Some(Duration::from_millis(20)), fx.transmitter.next_deadline());
        fx.transmitter.check_timers(&mut local, Duration::from_millis(20));
        assert_eq!(Some(Duration::from_millis(54)), fx.transmitter.next_deadline());
        fx.network.set_blocked(&fx.remote, false);
        fx.transmitter.check_timers(&mut local, Duration::from_millis(54));
        fx.ack_all(AckStatus::Ok);
        fx.pump(&mut local, Duration::from_millis(54));
        let done = fx.transmitter.take_completed();
        assert_eq!(Some(SendStatus::Sent), done[0].status());
        assert_eq!(2, done[0].attempts());
    }

    #[test]
    fn retries_are_bounded() {
        let settings = TransmitSettings {
            max_retries: 3,
            ..TransmitSettings::default()
        };
        let mut fx = Fixture::new(settings);
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        fx.network.set_blocked(&fx.remote, true);
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        let mut now = Duration::ZERO;
        while let Some(deadline) = fx.transmitter.next_deadline() {
            now = deadline;
            fx.transmitter.check_timers(&mut local, now);
        }
        let done = fx.transmitter.take_completed();
        assert_eq!(Some(SendStatus::Failed), done[0].status());
        assert_eq!(4, done[0].attempts());
    }

    #[test]
    fn garbled_and_missing_acks_are_retried() {
        let settings = TransmitSettings {
            ack_timeout: Duration::from_millis(100),
            ..TransmitSettings::default()
        };
        let mut fx = Fixture::new(settings);
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        fx.network.garble_acks(&fx.local, 1);
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        fx.ack_all(AckStatus::Ok);
        fx.pump(&mut local, Duration::ZERO);
        assert!(fx.transmitter.take_completed().is_empty());
        fx.network.drop_acks(&fx.local, 1);
        fx.transmitter.check_timers(&mut local, Duration::from_millis(20));
        fx.ack_all(AckStatus::Ok);
        fx.pump(&mut local, Duration::from_millis(20));
        assert!(fx.transmitter.take_completed().is_empty());
        fx.transmitter.check_timers(&mut local, Duration::from_millis(120));
        fx.transmitter.check_timers(&mut local, Duration::from_millis(154));
        fx.ack_all(AckStatus::Ok);
        fx.pump(&mut local, Duration::from_millis(154));
        let done = fx.transmitter.take_completed();
        assert_eq!(Some(SendStatus::Sent), done[0].status());
        assert_eq!(3, fx.network.sent().len());
    }

    #[test]
    fn receiver_verdicts_are_reported() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut local = fx.network.transport(fx.local.clone());
        fx.network.transport(fx.remote.clone());
        let intent = fx.intent(Duration::ZERO);
        fx.transmitter.submit(&mut local, intent, Duration::ZERO);
        fx.ack_all(AckStatus::DeadTarget);
        fx.pump(&mut local, Duration::ZERO);
        let done = fx.transmitter.take_completed();
        assert_eq!(Some(SendStatus::DeadTarget), done[0].status());
    }

    #[test]
    fn completion_is_idempotent() {
        let mut fx = Fixture::new(TransmitSettings::default());
        let mut intent = fx.intent(Duration::ZERO);
        assert!(intent.complete(SendStatus::Sent));
        assert!(!intent.complete(SendStatus::Failed));
        assert_eq!(Some(SendStatus::Sent), intent.status());
    }
}
