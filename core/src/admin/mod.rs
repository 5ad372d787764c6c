//! The admin of a system.
//!
//! Every system has exactly one admin, addressed by the nil id. It owns the
//! top-level actors, answers creation requests, carries out the convention's
//! effects, routes dead letters and forwarded messages, and manages loaded sources.

use crate::{
    actors::{ActorAddress, SystemPath, UniquePath},
    convention::ConventionEffect,
    messaging::{CapabilityValue, Message},
    runtime::{ActorSystem, ConventionSend, Delivery},
    transmit::SendStatus,
};
use slog::{debug, info, trace, warn};
use uuid::Uuid;

mod creation;
mod sources;

impl ActorSystem {
    pub(crate) fn admin_receive(&mut self, sender: ActorAddress, message: Message) {
        let sender = match self.endpoints.get_mut(&Uuid::nil()) {
            Some(endpoint) => endpoint.addresses.import_addr(&sender),
            None => sender,
        };
        let now = self.now();
        match message {
            Message::PendingActor(request) => self.handle_pending_actor(sender, request),
            Message::QueryExists => {
                let ack = Message::QueryAck {
                    system_name: self.settings.label.clone(),
                    system_version: self.settings.version.clone(),
                    in_shutdown: self.is_shutting_down(),
                };
                self.send_from(Uuid::nil(), &sender, ack, Vec::new());
            }
            Message::SystemShutdown | Message::ActorExitRequest { .. } => {
                self.begin_shutdown(Some(sender))
            }
            Message::CapabilityUpdate { name, value } => self.set_capability(name, value),
            Message::NotifyOnSystemRegistration { enable } => self.set_observer(sender, enable),
            Message::DeadLetterHandler { enable } => self.set_dead_letter_handler(sender, enable),
            Message::PreRegisterSystem { remote_admin } => match remote_admin.unique() {
                Some(remote) => {
                    let effects = self.convention.pre_register(now, remote);
                    self.apply_convention(effects);
                }
                None => warn!(self.log, "Cannot pre-register with unresolved {}", remote_admin),
            },
            Message::Register(registration) => {
                if self.is_shutting_down() {
                    trace!(self.log, "Ignoring registration of {} while shutting down", registration.admin);
                } else {
                    let effects = self.convention.got_register(now, registration);
                    self.apply_convention(effects);
                }
            }
            Message::DeRegister {
                admin,
                pre_registered,
            } => {
                let effects = self.convention.got_deregister(now, &admin, pre_registered);
                self.apply_convention(effects);
            }
            Message::Invite => {
                if !self.is_shutting_down() {
                    let effects = self.convention.got_invite(now, &sender);
                    self.apply_convention(effects);
                }
            }
            Message::ChildActorExited { child } => {
                if let Some(child) = child.unique() {
                    self.admin_child_exited(&child);
                }
            }
            Message::DeadEnvelope {
                dead_address,
                message,
            } => self.route_dead_letter(dead_address, *message),
            Message::Forward {
                target,
                hops,
                sender: origin,
                message,
            } => self.forward(target, hops, origin, *message),
            Message::LoadSource { bytes, info } => self.load_source_bytes(bytes, info),
            Message::UnloadSource { hash } => self.unload_source_hash(&sender, hash),
            Message::ValidatedSource { hash, bytes, info } => {
                self.source_validated(&sender, hash, bytes, info)
            }
            Message::SourceHashTransferRequest {
                hash,
                prefer_original,
            } => self.transfer_request(sender, hash, prefer_original),
            Message::SourceHashTransferReply {
                hash,
                bytes,
                info,
                checksum,
            } => self.transfer_reply(&sender, hash, bytes, info, checksum),
            Message::RegisterSourceAuthority => self.register_authority(sender),
            other => debug!(self.log, "Admin ignores {} from {}", other.kind(), sender),
        }
    }

    /// Carry out what the convention asked for
    pub(crate) fn apply_convention(&mut self, effects: Vec<ConventionEffect>) {
        for effect in effects {
            match effect {
                ConventionEffect::Send { to, message, tag } => {
                    let now = self.now();
                    let kind = message.kind();
                    let release = self.hysteresis.send(
                        now,
                        to.clone(),
                        kind,
                        ConventionSend {
                            to: to.clone(),
                            message,
                            tags: tag.into_iter().collect(),
                        },
                    );
                    // superseded sends finish with the send that replaced them
                    for superseded in release.superseded {
                        trace!(self.log, "{} to {} superseded", kind, superseded.to);
                        match self.hysteresis.queued_for(&to, kind) {
                            Some(newer) => newer.tags.extend(superseded.tags),
                            None => self.run_tags(superseded.tags, SendStatus::Failed),
                        }
                    }
                    for send in release.transmit {
                        self.transmit_convention(send);
                    }
                }
                ConventionEffect::CancelSends(peer) => {
                    let cancelled = self.hysteresis.cancel(&peer);
                    if !cancelled.is_empty() {
                        debug!(self.log, "Cancelled {} sends to {}", cancelled.len(), peer);
                    }
                    for send in cancelled {
                        self.run_tags(send.tags, SendStatus::Failed);
                    }
                }
                ConventionEffect::ResetConnection(peer) => {
                    self.transmitter
                        .reset_connection(self.transport.as_mut(), peer.system());
                }
                ConventionEffect::Notify { observer, message } => {
                    self.send_from(Uuid::nil(), &observer, message, Vec::new())
                }
            }
        }
    }

    pub(crate) fn transmit_convention(&mut self, send: ConventionSend) {
        let ConventionSend { to, message, tags } = send;
        self.send_from(Uuid::nil(), &ActorAddress::Unique(to), message, tags);
    }

    /// A top-level actor is gone
    pub(crate) fn admin_child_exited(&mut self, child: &UniquePath) {
        self.admin_children.child_exited(child);
        if let Some(requester) = self.nannies.remove(child) {
            trace!(self.log, "Telling {} that {} exited", requester, child);
            self.send_from(
                Uuid::nil(),
                &requester,
                Message::ChildActorExited {
                    child: ActorAddress::Unique(child.clone()),
                },
                Vec::new(),
            );
        }
    }

    pub(crate) fn set_capability(&mut self, name: String, value: Option<CapabilityValue>) {
        let changed = match value {
            Some(value) => {
                if self.capabilities.get(&name) == Some(&value) {
                    false
                } else {
                    info!(self.log, "Capability {} is now {}", name, value);
                    self.capabilities.insert(name, value);
                    true
                }
            }
            None => {
                let removed = self.capabilities.remove(&name).is_some();
                if removed {
                    info!(self.log, "Capability {} removed", name);
                }
                removed
            }
        };
        if !changed {
            return;
        }
        let now = self.now();
        let effects = self
            .convention
            .update_capabilities(now, self.capabilities.clone());
        self.apply_convention(effects);
        let admin = self.admin_address();
        let ids: Vec<Uuid> = self.cells.keys().copied().collect();
        for id in ids {
            self.mailbox.push_back(Delivery {
                to: id,
                sender: admin.clone(),
                message: Message::NewCapabilities {
                    capabilities: self.capabilities.clone(),
                    admin: admin.clone(),
                },
            });
        }
    }

    pub(crate) fn set_observer(&mut self, observer: ActorAddress, enable: bool) {
        if enable {
            let now = self.now();
            let effects = self.convention.add_observer(now, observer);
            self.apply_convention(effects);
        } else {
            self.convention.remove_observer(&observer);
        }
    }

    pub(crate) fn set_dead_letter_handler(&mut self, handler: ActorAddress, enable: bool) {
        if enable {
            if !self.dead_letter_handlers.contains(&handler) {
                debug!(self.log, "{} handles dead letters", handler);
                self.dead_letter_handlers.push(handler);
            }
        } else {
            self.dead_letter_handlers.retain(|h| *h != handler);
        }
    }

    fn route_dead_letter(&mut self, dead_address: ActorAddress, message: Message) {
        if self.dead_letter_handlers.is_empty() {
            warn!(
                self.log,
                "Dropping {} for dead {}, no dead letter handler", message.kind(), dead_address
            );
            return;
        }
        let handlers = self.dead_letter_handlers.clone();
        for handler in handlers {
            self.send_from(
                Uuid::nil(),
                &handler,
                Message::DeadEnvelope {
                    dead_address: dead_address.clone(),
                    message: Box::new(message.clone()),
                },
                Vec::new(),
            );
        }
    }

    /// Pass a forwarded message on, or deliver it if this system is its last hop
    fn forward(&mut self, target: UniquePath, hops: Vec<SystemPath>, origin: ActorAddress, message: Message) {
        let local = self.admin.system().clone();
        let hops: Vec<SystemPath> = hops.into_iter().filter(|hop| *hop != local).collect();
        match hops.split_first() {
            None if self.is_local(&target) => {
                let to = *target.id();
                if self.is_hosted(&to) {
                    self.mailbox.push_back(Delivery {
                        to,
                        sender: origin,
                        message,
                    });
                } else {
                    self.dead_letter(origin, ActorAddress::Unique(target), message);
                }
            }
            None => {
                let next = target.system().admin();
                self.send_from(
                    Uuid::nil(),
                    &ActorAddress::Unique(next),
                    Message::Forward {
                        target,
                        hops: Vec::new(),
                        sender: origin,
                        message: Box::new(message),
                    },
                    Vec::new(),
                );
            }
            Some((next, rest)) => {
                trace!(self.log, "Forwarding {} for {} via {}", message.kind(), target, next);
                self.send_from(
                    Uuid::nil(),
                    &ActorAddress::Unique(next.admin()),
                    Message::Forward {
                        target,
                        hops: rest.to_vec(),
                        sender: origin,
                        message: Box::new(message),
                    },
                    Vec::new(),
                );
            }
        }
    }
}
