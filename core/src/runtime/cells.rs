use super::*;

use crate::{
    actors::{ActorAddress, ActorContext, AddressKey, Effect, UniquePath},
    messaging::{Capabilities, Envelope, Message},
    supervision::{deliver, ExitDecision, Outcome},
    timer::ScheduledWakeup,
};
use slog::{crit, debug, info, trace, warn};
use uuid::Uuid;

impl ActorSystem {
    /// Hand a delivery to the admin, the external inbox or an actor
    pub(crate) fn deliver(&mut self, delivery: Delivery) {
        let Delivery {
            to,
            sender,
            message,
        } = delivery;
        match message {
            Message::PendingActorResponse(response) => self.pending_actor_response(to, response),
            message if to.is_nil() => self.admin_receive(sender, message),
            message if to == self.external => {
                let sender = match self.endpoints.get_mut(&to) {
                    Some(endpoint) => endpoint.addresses.import_addr(&sender),
                    None => sender,
                };
                self.inbox.push_back(Envelope { sender, message });
            }
            message => self.cell_receive(to, sender, message),
        }
    }

    /// Route `message` to the dead-letter handling of the admin
    pub(crate) fn dead_letter(&mut self, sender: ActorAddress, dead_address: ActorAddress, message: Message) {
        if message.is_dead_letter_notice() {
            trace!(self.log, "Dropping {} for dead {}", message.kind(), dead_address);
            return;
        }
        self.mailbox.push_back(Delivery {
            to: Uuid::nil(),
            sender,
            message: Message::DeadEnvelope {
                dead_address,
                message: Box::new(message),
            },
        });
    }

    fn cell_receive(&mut self, id: Uuid, sender: ActorAddress, message: Message) {
        if !self.cells.contains_key(&id) {
            let me = self.address_of(id);
            match message {
                Message::ActorExitRequest { .. } => {
                    if let Some(parent) = sender.unique().filter(|p| self.is_local(p)) {
                        let child = self.path_of(id);
                        self.child_gone(*parent.id(), &child);
                    }
                }
                message => self.dead_letter(sender, me, message),
            }
            return;
        }
        let sender = match self.endpoints.get_mut(&id) {
            Some(endpoint) => endpoint.addresses.import_addr(&sender),
            None => sender,
        };
        match message {
            Message::ActorExitRequest { recursive } => {
                let running = self
                    .cells
                    .get(&id)
                    .map_or(false, |cell| cell.supervisor.accepts_children());
                if running {
                    self.run_handler(id, sender, Message::ActorExitRequest { recursive });
                }
                self.exit_actor(id, recursive);
            }
            Message::ChildActorExited { child } => {
                let child_path = match child.unique() {
                    Some(path) => path,
                    None => return,
                };
                let (done, running) = match self.cells.get_mut(&id) {
                    Some(cell) => (
                        cell.supervisor.child_exited(&child_path),
                        cell.supervisor.accepts_children(),
                    ),
                    None => return,
                };
                if done {
                    self.finish_exit(id);
                } else if running {
                    self.run_handler(id, sender, Message::ChildActorExited { child });
                }
            }
            Message::NewCapabilities {
                capabilities,
                admin,
            } => {
                let compatible = match self.cells.get(&id) {
                    Some(cell) => cell
                        .class
                        .compatible(&capabilities, cell.requirements.as_ref()),
                    None => return,
                };
                self.run_handler(id, sender, Message::NewCapabilities { capabilities, admin });
                if !compatible {
                    if let Some(cell) = self.cells.get(&id) {
                        info!(cell.log, "Capabilities changed, no longer compatible with this system");
                    }
                    self.exit_actor(id, true);
                }
            }
            message => self.run_handler(id, sender, message),
        }
    }

    fn run_handler(&mut self, id: Uuid, sender: ActorAddress, message: Message) {
        let now = self.now();
        let shutting_down = self.is_shutting_down();
        let ActorSystem {
            cells,
            endpoints,
            capabilities,
            ..
        } = self;
        let capabilities: &Capabilities = capabilities;
        let (cell, endpoint) = match (cells.get_mut(&id), endpoints.get_mut(&id)) {
            (Some(cell), Some(endpoint)) => (cell, endpoint),
            _ => return,
        };
        cell.supervisor.start();
        let path = &cell.path;
        let parent = &cell.parent;
        let class_name = &cell.class_name;
        let log = &cell.log;
        let actor = &mut cell.actor;
        let addresses = &mut endpoint.addresses;
        let kind = message.kind();
        let outcome = deliver(
            |msg| {
                let mut ctx = ActorContext::new(
                    path,
                    parent,
                    class_name,
                    &mut *addresses,
                    capabilities,
                    log,
                    now,
                    shutting_down,
                );
                let handled = actor.receive(&mut ctx, &sender, msg)?;
                Ok((handled, ctx.into_effects()))
            },
            message,
        );
        let log = log.clone();
        match outcome {
            Outcome::Done(effects) => self.apply_effects(id, effects),
            Outcome::Exit(effects) => {
                self.apply_effects(id, effects);
                self.exit_actor(id, true);
            }
            Outcome::Poison(original) => {
                warn!(log, "{} from {} failed twice, returning it", kind, sender);
                self.send_from(
                    id,
                    &sender,
                    Message::PoisonMessage {
                        original: Box::new(original),
                    },
                    Vec::new(),
                );
            }
            Outcome::Retry(_) | Outcome::Dropped => {
                warn!(log, "{} from {} failed twice, dropping it", kind, sender);
            }
            Outcome::Fatal(reason) => {
                crit!(log, "Actor failed fatally handling {}: {}", kind, reason);
                self.exit_actor(id, true);
            }
        }
    }

    fn apply_effects(&mut self, id: Uuid, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { target, message } => self.send_from(id, &target, message, Vec::new()),
                Effect::Create { instance, request } => self.request_creation(id, instance, request),
                Effect::Wakeup { delay, payload } => {
                    let deadline = self.now() + delay;
                    self.wakeups.schedule(
                        deadline,
                        ScheduledWakeup {
                            target: id,
                            delay,
                            payload,
                        },
                    );
                }
                Effect::Exit => self.exit_actor(id, true),
            }
        }
    }

    /// Ask the hosted actor `id` to exit
    ///
    /// Recursive exits wait for all children, non-recursive ones leave them to the admin.
    pub(crate) fn exit_actor(&mut self, id: Uuid, recursive: bool) {
        let decision = match self.cells.get_mut(&id) {
            Some(cell) => cell.supervisor.request_exit(recursive),
            None => return,
        };
        match decision {
            ExitDecision::AlreadyExiting => (),
            ExitDecision::Drain(children) => {
                if let Some(cell) = self.cells.get(&id) {
                    debug!(cell.log, "Waiting for {} children to exit", children.len());
                }
                for child in children {
                    self.send_from(
                        id,
                        &ActorAddress::Unique(child),
                        Message::ActorExitRequest { recursive: true },
                        Vec::new(),
                    );
                }
            }
            ExitDecision::ExitNow { orphans } => {
                for orphan in orphans {
                    self.adopt(orphan);
                }
                self.finish_exit(id);
            }
        }
    }

    fn adopt(&mut self, orphan: UniquePath) {
        let admin = self.admin_address();
        if self.is_local(&orphan) {
            if let Some(cell) = self.cells.get_mut(orphan.id()) {
                cell.parent = admin;
            }
        }
        self.admin_children.add_child(orphan);
    }

    /// Remove an actor that is gone and tell its parent
    pub(crate) fn finish_exit(&mut self, id: Uuid) {
        let cell = match self.cells.remove(&id) {
            Some(cell) => cell,
            None => return,
        };
        let me = ActorAddress::Unique(cell.path.clone());
        self.wakeups.retain(|wakeup| wakeup.target != id);
        self.creations.retain(|(owner, _), _| *owner != id);
        self.creation_timeouts.retain(|(owner, _)| *owner != id);
        self.failed_placeholders
            .retain(|key| !matches!(key, AddressKey::Local { owner, .. } if *owner == id));
        if let Some(hash) = cell.source_hash.as_ref() {
            self.sources.forget_instance(hash, &cell.path);
        }
        if let Some(name) = cell.global_name.as_ref() {
            if self.global_names.get(name) == Some(&cell.path) {
                self.global_names.remove(name);
            }
        }
        if matches!(&self.authority, Authority::Actor(authority) if *authority == me) {
            info!(self.log, "Source authority {} exited", me);
            self.authority = Authority::Unset;
        }
        self.dead_letter_handlers.retain(|handler| *handler != me);
        self.convention.remove_observer(&me);
        debug!(cell.log, "Actor exited");
        self.send_from(
            id,
            &cell.parent,
            Message::ChildActorExited { child: me },
            Vec::new(),
        );
    }

    /// `child` of the local instance `parent` is gone without saying so
    pub(crate) fn child_gone(&mut self, parent: Uuid, child: &UniquePath) {
        if parent.is_nil() {
            self.admin_child_exited(child);
        } else if let Some(cell) = self.cells.get_mut(&parent) {
            if cell.supervisor.child_exited(child) {
                self.finish_exit(parent);
            }
        }
    }
}
