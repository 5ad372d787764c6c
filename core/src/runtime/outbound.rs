use super::*;

use crate::{
    actors::{ActorAddress, AddressKey, SystemPath},
    addressing::{Admission, IntentId, Prepared},
    messaging::{Message, WireFrame},
    net::{AckStatus, TransportEvent},
    timer::ExpirationTimer,
    transmit::{CompletionTag, SendStatus, TransmitIntent},
};
use slog::{debug, trace, warn};
use std::time::Duration;
use uuid::Uuid;

enum Route {
    Admitted(Admission<TransmitIntent>),
    Refused(Vec<CompletionTag>, SendStatus),
}

impl ActorSystem {
    fn next_intent_id(&mut self) -> IntentId {
        self.next_intent += 1;
        IntentId(self.next_intent)
    }

    /// Send `message` to `target` on behalf of the local instance `owner`
    ///
    /// The target is resolved through the owner's address table. Messages for
    /// placeholders are held until the placeholder resolves, messages for targets
    /// known to be dead are turned into dead letters.
    pub(crate) fn send_from(
        &mut self,
        owner: Uuid,
        target: &ActorAddress,
        message: Message,
        tags: Vec<CompletionTag>,
    ) {
        if self.is_shut_down() {
            trace!(self.log, "Not sending {} to {} after shutdown", message.kind(), target);
            self.run_tags(tags, SendStatus::Failed);
            return;
        }
        let now = self.now();
        let id = self.next_intent_id();
        let sender = self.address_of(owner);
        let expiry = ExpirationTimer::after(now, self.settings.transmit.timeout);
        let backoff = self.settings.transmit.backoff();
        let kind = message.kind();
        let route = match self.endpoints.get_mut(&owner) {
            None => Route::Refused(tags, SendStatus::Failed),
            Some(endpoint) => {
                let exported = endpoint.addresses.export(target);
                match endpoint.addresses.prepare_send(target, message, now) {
                    Prepared::Drop => Route::Refused(tags, SendStatus::DeadTarget),
                    Prepared::Unresolved(_) if self.failed_placeholders.contains(&target.key()) => {
                        Route::Refused(tags, SendStatus::DeadTarget)
                    }
                    Prepared::Unresolved(message) => {
                        let intent = tags.into_iter().fold(
                            TransmitIntent::new(id, owner, sender, target.clone(), message, expiry)
                                .with_backoff(backoff),
                            TransmitIntent::with_tag,
                        );
                        Route::Admitted(endpoint.outbound.admit(&[target.key()], id, intent, false))
                    }
                    Prepared::Ready(path, message) => {
                        let mut keys = vec![target.key()];
                        // a dead target's letter still queues behind sends to the target itself
                        let resolved = match exported {
                            Some(dead) if dead != path => Some(dead),
                            _ if target.unique().as_ref() == Some(&path) => Some(path.clone()),
                            _ => None,
                        };
                        if let Some(resolved) = resolved.map(|p| AddressKey::Unique(p.direct())) {
                            if resolved != keys[0] {
                                keys.push(resolved);
                            }
                        }
                        let mut intent = tags.into_iter().fold(
                            TransmitIntent::new(id, owner, sender, target.clone(), message, expiry)
                                .with_backoff(backoff),
                            TransmitIntent::with_tag,
                        );
                        intent.set_destination(path);
                        Route::Admitted(endpoint.outbound.admit(&keys, id, intent, true))
                    }
                }
            }
        };
        match route {
            Route::Admitted(Admission::Transmit(intent)) => self.dispatch(intent),
            Route::Admitted(Admission::Queued) => {
                trace!(self.log, "Holding {} for {}", kind, target);
            }
            Route::Refused(tags, status) => {
                debug!(self.log, "Not sending {} to {}: {:?}", kind, target, status);
                self.run_tags(tags, status);
            }
        }
    }

    /// Hand an admitted intent on, unless the outbound rate is over its limit
    pub(crate) fn dispatch(&mut self, intent: TransmitIntent) {
        let now = self.now();
        let delay = self.throttle.record(now);
        if delay > Duration::ZERO {
            trace!(self.log, "Throttling {} by {:?}", intent.message.kind(), delay);
            self.delayed.schedule(now + delay, intent);
        } else {
            self.launch(intent);
        }
    }

    /// Deliver locally, or submit to the transmitter
    pub(crate) fn launch(&mut self, mut intent: TransmitIntent) {
        let now = self.now();
        if intent.destination().is_none() {
            let resolved = self
                .endpoints
                .get(&intent.owner)
                .and_then(|endpoint| endpoint.addresses.export(&intent.target));
            match resolved {
                Some(path) => intent.set_destination(path),
                None => {
                    intent.complete(SendStatus::Failed);
                    self.local_done.push(intent);
                    return;
                }
            }
        }
        let destination = match intent.destination() {
            Some(destination) => destination.clone(),
            None => return,
        };
        let local = self.admin.system().clone();
        let hops: Vec<SystemPath> = destination
            .route()
            .iter()
            .filter(|hop| **hop != local)
            .cloned()
            .collect();
        if let Some((next, rest)) = hops.split_first() {
            trace!(self.log, "Routing {} to {} via {}", intent.message.kind(), destination, next);
            intent.message = Message::Forward {
                target: destination.direct(),
                hops: rest.to_vec(),
                sender: intent.sender.clone(),
                message: Box::new(intent.message.clone()),
            };
            intent.set_destination(next.admin());
        } else if !destination.route().is_empty() {
            intent.set_destination(destination.direct());
        }
        let destination = match intent.destination() {
            Some(destination) => destination.clone(),
            None => return,
        };
        if *destination.system() == local {
            let to = *destination.id();
            if self.is_hosted(&to) {
                self.mailbox.push_back(Delivery {
                    to,
                    sender: intent.sender.clone(),
                    message: intent.message.clone(),
                });
                intent.complete(SendStatus::Sent);
            } else {
                intent.complete(SendStatus::DeadTarget);
            }
            self.local_done.push(intent);
        } else {
            self.transmitter.submit(self.transport.as_mut(), intent, now);
        }
    }

    /// Run the follow-up of every finished intent
    ///
    /// Returns `true` if there were any.
    pub(crate) fn process_completions(&mut self) -> bool {
        let mut any = false;
        loop {
            let mut done = self.transmitter.take_completed();
            done.append(&mut self.local_done);
            if done.is_empty() {
                return any;
            }
            any = true;
            for intent in done {
                self.completed(intent);
            }
        }
    }

    fn completed(&mut self, mut intent: TransmitIntent) {
        let status = intent.status().unwrap_or(SendStatus::Failed);
        let now = self.now();
        let owner = intent.owner;
        let next = match self.endpoints.get_mut(&owner) {
            Some(endpoint) => {
                if status == SendStatus::DeadTarget {
                    endpoint.addresses.mark_dead(&intent.target, now);
                }
                endpoint.outbound.complete(intent.id())
            }
            None => None,
        };
        let tags = intent.take_tags();
        match status {
            SendStatus::Sent => (),
            SendStatus::DeadTarget => self.target_dead(intent),
            SendStatus::Failed => warn!(
                self.log,
                "Failed to send {} to {}",
                intent.message.kind(),
                intent.target
            ),
            SendStatus::BadPacket => warn!(
                self.log,
                "{} to {} was rejected as a bad packet",
                intent.message.kind(),
                intent.target
            ),
        }
        self.run_tags(tags, status);
        if let Some((_, next)) = next {
            self.dispatch(next);
        }
    }

    fn target_dead(&mut self, intent: TransmitIntent) {
        let TransmitIntent {
            owner,
            sender,
            target,
            message,
            ..
        } = intent;
        let rewritten = target.unique().map_or(false, |path| !path.is_admin());
        let message = match message {
            Message::Forward { message, .. } if rewritten => *message,
            message => message,
        };
        debug!(self.log, "{} is dead, {} undeliverable", target, message.kind());
        match message {
            Message::ActorExitRequest { .. } => {
                if let Some(child) = target.unique() {
                    self.child_gone(owner, &child);
                }
            }
            message => self.dead_letter(sender, target, message),
        }
    }

    /// Carry out the follow-up work attached to a finished transmit
    pub(crate) fn run_tags(&mut self, tags: Vec<CompletionTag>, status: SendStatus) {
        let now = self.now();
        for tag in tags {
            match tag {
                CompletionTag::ConventionRegistration { peer } => {
                    let effects = self.convention.on_registration_sent(now, &peer, status.is_success());
                    self.apply_convention(effects);
                }
                CompletionTag::ConventionInvite { peer } => {
                    self.convention.on_invite_sent(now, &peer, status.is_success());
                }
                CompletionTag::ForwardedCreation {
                    mut request,
                    candidate,
                } => {
                    if !status.is_success() {
                        debug!(
                            self.log,
                            "Forwarding creation of {} to {} failed, looking elsewhere",
                            request.class_name,
                            candidate
                        );
                        request.already_tried.push(ActorAddress::Unique(candidate));
                        let admin = self.admin_address();
                        self.handle_pending_actor(admin, request);
                    }
                }
            }
        }
    }

    pub(crate) fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Received { conn, seq, payload } => {
                let status = match WireFrame::decode(&payload) {
                    Err(e) => {
                        warn!(self.log, "Received a bad packet: {}", e);
                        AckStatus::BadPacket
                    }
                    Ok(frame) if !self.is_local(&frame.target) || !self.is_hosted(frame.target.id()) => {
                        debug!(
                            self.log,
                            "{} from {} for unknown {}",
                            frame.message.kind(),
                            frame.sender,
                            frame.target
                        );
                        AckStatus::DeadTarget
                    }
                    Ok(frame) => {
                        self.mailbox.push_back(Delivery {
                            to: *frame.target.id(),
                            sender: frame.sender,
                            message: frame.message,
                        });
                        AckStatus::Ok
                    }
                };
                self.transport.acknowledge(conn, seq, status);
            }
            event => {
                let now = self.now();
                self.transmitter
                    .handle_event(self.transport.as_mut(), event, now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actors::UniquePath, simulation::Scenario};

    #[test]
    fn dead_letters_for_placeholders_queue_with_the_dead_actor() {
        let mut scenario = Scenario::new();
        let conf = scenario.config("local://10.0.0.1:1900").expect("config");
        let index = scenario.add_system(conf).expect("system");
        let sys = scenario.system(index);
        let now = sys.now();
        let remote = UniquePath::new(
            "local://10.0.0.2:1900".parse().expect("system path"),
            Uuid::new_v4(),
        );
        let placeholder = {
            let endpoint = sys.endpoints.get_mut(&Uuid::nil()).expect("admin endpoint");
            let placeholder = endpoint.addresses.create_local_address();
            let instance = match &placeholder {
                ActorAddress::Local(local) => local.instance(),
                ActorAddress::Unique(_) => panic!("Expected a placeholder"),
            };
            assert!(endpoint
                .addresses
                .associate(&Uuid::nil(), instance, remote.clone()));
            endpoint
                .addresses
                .mark_dead(&ActorAddress::Unique(remote.clone()), now);
            placeholder
        };

        sys.send_from(Uuid::nil(), &placeholder, Message::text("seq", "1"), Vec::new());
        sys.send_from(
            Uuid::nil(),
            &ActorAddress::Unique(remote.clone()),
            Message::text("seq", "2"),
            Vec::new(),
        );
        let outbound = &sys.endpoints[&Uuid::nil()].outbound;
        assert_eq!(1, outbound.in_flight(&AddressKey::Unique(remote)));
        assert_eq!(2, outbound.len());
    }
}
