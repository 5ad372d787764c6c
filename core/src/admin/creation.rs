use crate::{
    actors::{ActorAddress, ActorClass, AddressKey, CreateRequest, UniquePath},
    messaging::{satisfies, Envelope, Message, PendingActor, PendingActorError, PendingActorResponse},
    runtime::{ActorCell, ActorSystem, CreationState, Delivery, Endpoint},
    sources::SourceState,
    supervision::Supervisor,
    transmit::{CompletionTag, SendStatus},
};
use slog::{debug, info, o, warn};
use std::sync::Arc;
use uuid::Uuid;

type CreationResult = Result<UniquePath, (PendingActorError, String)>;

impl ActorSystem {
    /// Create the actor described by `request` for placeholder `instance` of `owner`
    ///
    /// Classes that are registered here, compatible and neither global nor loaded from
    /// a source are created right away. Everything else goes through the admin.
    pub(crate) fn request_creation(&mut self, owner: Uuid, instance: usize, request: CreateRequest) {
        if self.is_shutting_down() {
            self.creation_failed(
                owner,
                instance,
                PendingActorError::ShuttingDown,
                "the actor system is shutting down".to_string(),
            );
            return;
        }
        let direct = if request.global_name.is_none() && request.source_hash.is_none() {
            self.classes
                .get(&request.class_name)
                .filter(|class| class.compatible(&self.capabilities, request.requirements.as_ref()))
        } else {
            None
        };
        if let Some(class) = direct {
            let parent = if owner == self.external {
                self.admin_address()
            } else {
                self.address_of(owner)
            };
            match self.spawn(class, &request, parent) {
                Ok(path) => {
                    if !self.resolve_creation(owner, instance, path.clone()) {
                        debug!(self.log, "Nobody waits for {} any more", path);
                    }
                }
                Err(detail) => {
                    self.creation_failed(owner, instance, PendingActorError::ImportError, detail)
                }
            }
            return;
        }
        let CreateRequest {
            class_name,
            requirements,
            global_name,
            source_hash,
        } = request;
        let pending = PendingActor {
            class_name,
            for_actor: Some(self.address_of(owner)),
            instance,
            requirements,
            global_name,
            source_hash,
            already_tried: Vec::new(),
        };
        let deadline = self.now() + self.settings.max_creation_delay;
        self.creations.insert((owner, instance), CreationState::Pending);
        self.creation_timeouts.schedule(deadline, (owner, instance));
        let admin = self.admin_address();
        self.send_from(owner, &admin, Message::PendingActor(pending), Vec::new());
    }

    /// Instantiate and register a new local actor
    fn spawn(
        &mut self,
        class: Arc<dyn ActorClass>,
        request: &CreateRequest,
        parent: ActorAddress,
    ) -> Result<UniquePath, String> {
        let actor = class.instantiate()?;
        let id = Uuid::new_v4();
        let path = self.path_of(id);
        let log = self.log.new(o!(
            "actor" => id.to_string(),
            "class" => request.class_name.clone(),
        ));
        self.endpoints.insert(
            id,
            Endpoint::new(id, self.admin.clone(), self.settings.dead_address_timeout),
        );
        let accepted = match parent.unique() {
            Some(p) if self.is_local(&p) && !p.is_admin() => match self.cells.get_mut(p.id()) {
                Some(cell) => cell.supervisor.add_child(path.clone()),
                None => false,
            },
            _ => self.admin_children.add_child(path.clone()),
        };
        if let Some(hash) = request.source_hash.as_ref() {
            self.sources.note_instance(hash, path.clone());
        }
        if let Some(name) = request.global_name.as_ref() {
            self.global_names
                .entry(name.clone())
                .or_insert_with(|| path.clone());
        }
        debug!(log, "Actor created"; "parent" => %parent);
        self.cells.insert(
            id,
            ActorCell {
                path: path.clone(),
                parent,
                class_name: request.class_name.clone(),
                class,
                requirements: request.requirements.clone(),
                source_hash: request.source_hash.clone(),
                global_name: request.global_name.clone(),
                actor,
                supervisor: Supervisor::new(),
                log,
            },
        );
        if !accepted {
            debug!(self.log, "Parent of {} is exiting, stopping it again", path);
            self.exit_actor(id, true);
        }
        Ok(path)
    }

    /// Bind the placeholder to the created actor and release what was held for it
    fn resolve_creation(&mut self, owner: Uuid, instance: usize, path: UniquePath) -> bool {
        let endpoint = match self.endpoints.get_mut(&owner) {
            Some(endpoint) => endpoint,
            None => return false,
        };
        if !endpoint.addresses.associate(&owner, instance, path.clone()) {
            return false;
        }
        let placeholder = AddressKey::Local { owner, instance };
        let next = endpoint
            .outbound
            .merge_on_resolution(&placeholder, &AddressKey::Unique(path.direct()));
        if let Some((_, intent)) = next {
            self.dispatch(intent);
        }
        true
    }

    /// Tell `owner` its child will never exist
    fn creation_failed(&mut self, owner: Uuid, instance: usize, error: PendingActorError, detail: String) {
        let key = AddressKey::Local { owner, instance };
        let (abandoned, child) = match self.endpoints.get_mut(&owner) {
            Some(endpoint) => (
                endpoint.outbound.abandon(&key),
                endpoint.addresses.placeholder(instance),
            ),
            None => return,
        };
        if !abandoned.is_empty() {
            debug!(self.log, "Discarding {} messages held for the failed child", abandoned.len());
        }
        for (_, mut intent) in abandoned {
            let tags = intent.take_tags();
            self.run_tags(tags, SendStatus::Failed);
        }
        self.failed_placeholders.insert(key);
        let child = match child {
            Some(child) => child,
            None => return,
        };
        warn!(self.log, "Could not create a child of {}: {} ({})", owner, error, detail);
        let admin = self.admin_address();
        let notice = Message::ChildCreationFailed {
            child,
            error,
            detail,
        };
        if owner == self.external {
            self.inbox.push_back(Envelope {
                sender: admin,
                message: notice,
            });
        } else if self.cells.contains_key(&owner) {
            self.mailbox.push_back(Delivery {
                to: owner,
                sender: admin,
                message: notice,
            });
        }
    }

    /// The admin answered a creation request of `owner`
    pub(crate) fn pending_actor_response(&mut self, owner: Uuid, response: PendingActorResponse) {
        let key = (owner, response.instance);
        let state = self.creations.remove(&key);
        self.creation_timeouts.retain(|pending| *pending != key);
        let pending = state == Some(CreationState::Pending);
        match response.actual_address.as_ref().and_then(|address| address.unique()) {
            Some(path) => {
                if !pending || !self.resolve_creation(owner, response.instance, path.clone()) {
                    if response.global_name.is_none() {
                        debug!(self.log, "Stopping {}, nobody waits for it", path);
                        self.stop_remote_orphan(path);
                    }
                    return;
                }
                if self.is_local(&path) || response.global_name.is_some() {
                    return;
                }
                let accepted = if owner == self.external {
                    self.admin_children.add_child(path.clone())
                } else {
                    match self.cells.get_mut(&owner) {
                        Some(cell) => cell.supervisor.add_child(path.clone()),
                        None => false,
                    }
                };
                if !accepted {
                    self.stop_remote_orphan(path);
                }
            }
            None => {
                if pending {
                    let error = response
                        .error
                        .unwrap_or(PendingActorError::NoCompatibleSystem);
                    let detail = response.error_str.unwrap_or_default();
                    self.creation_failed(owner, response.instance, error, detail);
                }
            }
        }
    }

    fn stop_remote_orphan(&mut self, path: UniquePath) {
        self.send_from(
            Uuid::nil(),
            &ActorAddress::Unique(path),
            Message::ActorExitRequest { recursive: true },
            Vec::new(),
        );
    }

    pub(crate) fn creation_timed_out(&mut self, key: (Uuid, usize)) {
        match self.creations.get_mut(&key) {
            Some(state) if *state == CreationState::Pending => *state = CreationState::TimedOut,
            _ => return,
        }
        let detail = format!("no answer within {:?}", self.settings.max_creation_delay);
        self.creation_failed(key.0, key.1, PendingActorError::Timeout, detail);
    }

    /// Handle a creation request that reached this admin
    pub(crate) fn handle_pending_actor(&mut self, sender: ActorAddress, mut request: PendingActor) {
        if self.is_shutting_down() {
            let answer = Err((
                PendingActorError::ShuttingDown,
                "the actor system is shutting down".to_string(),
            ));
            self.answer_creation(&request, &sender, answer);
            return;
        }
        if let Some(name) = request.global_name.clone() {
            if let Some(existing) = self.global_names.get(&name).cloned() {
                if self.cells.contains_key(existing.id()) {
                    debug!(self.log, "Reusing {} for global name {}", existing, name);
                    self.answer_creation(&request, &sender, Ok(existing));
                    return;
                }
                self.global_names.remove(&name);
            }
        }
        let class = match request.source_hash.clone() {
            None => self.classes.get(&request.class_name),
            Some(hash) => match self.sources.status(&hash) {
                SourceState::Validating | SourceState::Transferring => {
                    if let Err((request, sender)) = self.sources.add_waiter(&hash, (request, sender)) {
                        self.handle_pending_actor(sender, request);
                    }
                    return;
                }
                SourceState::Unknown => {
                    match sender.unique().filter(|path| !self.is_local(path)) {
                        Some(remote) => {
                            let from = remote.system().admin();
                            if self
                                .sources
                                .begin_transfer(&hash, from.clone(), (request, sender))
                            {
                                debug!(self.log, "Fetching source {} from {}", hash, from);
                                self.send_from(
                                    Uuid::nil(),
                                    &ActorAddress::Unique(from),
                                    Message::SourceHashTransferRequest {
                                        hash,
                                        prefer_original: false,
                                    },
                                    Vec::new(),
                                );
                            }
                        }
                        None => {
                            let answer = Err((
                                PendingActorError::InvalidSourceHash,
                                format!("source {} is not loaded", hash),
                            ));
                            self.answer_creation(&request, &sender, answer);
                        }
                    }
                    return;
                }
                SourceState::Loaded => {
                    let source = self.sources.loaded(&hash).map(|source| source.validated.clone());
                    let loaded = match (self.module_provider.clone(), source) {
                        (Some(provider), Some(source)) => {
                            provider.load(&hash, &source, &request.class_name)
                        }
                        _ => Err("no module provider is configured".to_string()),
                    };
                    match loaded {
                        Ok(class) => Some(class),
                        Err(detail) => {
                            let answer = Err((PendingActorError::ImportError, detail));
                            self.answer_creation(&request, &sender, answer);
                            return;
                        }
                    }
                }
            },
        };
        let compatible = class.as_ref().map_or(false, |class| {
            class.compatible(&self.capabilities, request.requirements.as_ref())
        });
        if let (true, Some(class)) = (compatible, class.clone()) {
            let parent = self.parent_for(&request);
            let create = CreateRequest {
                class_name: request.class_name.clone(),
                requirements: request.requirements.clone(),
                global_name: request.global_name.clone(),
                source_hash: request.source_hash.clone(),
            };
            let answer = match self.spawn(class, &create, parent) {
                Ok(path) => {
                    if let Some(requester) = request.for_actor.clone() {
                        let remote = requester.unique().map_or(false, |p| !self.is_local(&p));
                        if remote && request.global_name.is_none() {
                            self.nannies.insert(path.clone(), requester);
                        }
                    }
                    Ok(path)
                }
                Err(detail) => Err((PendingActorError::ImportError, detail)),
            };
            self.answer_creation(&request, &sender, answer);
            return;
        }
        let me = ActorAddress::Unique(self.admin.clone());
        if !request.already_tried.contains(&me) {
            request.already_tried.push(me);
        }
        let exclude = sender
            .unique()
            .filter(|path| !self.is_local(path))
            .map(|path| path.system().admin());
        let requirements = request.requirements.clone();
        let now = self.now();
        let candidate = self.convention.find_remote_for(
            now,
            |capabilities| {
                requirements
                    .as_ref()
                    .map_or(true, |requirements| satisfies(capabilities, requirements))
            },
            &request.already_tried,
            exclude.as_ref(),
        );
        match candidate {
            Some(peer) => {
                info!(self.log, "Forwarding creation of {} to {}", request.class_name, peer);
                self.convention.note_delegated(&peer);
                let tag = CompletionTag::ForwardedCreation {
                    request: request.clone(),
                    candidate: peer.clone(),
                };
                self.send_from(
                    Uuid::nil(),
                    &ActorAddress::Unique(peer),
                    Message::PendingActor(request),
                    vec![tag],
                );
            }
            None => {
                let answer = if class.is_none() && request.source_hash.is_none() {
                    Err((
                        PendingActorError::InvalidActorClass,
                        format!("unknown actor class {}", request.class_name),
                    ))
                } else {
                    Err((
                        PendingActorError::NoCompatibleSystem,
                        format!("no system can host {}", request.class_name),
                    ))
                };
                self.answer_creation(&request, &sender, answer);
            }
        }
    }

    /// The parent of an actor created by the admin
    ///
    /// Local requesters parent their children themselves, everything else is parented by the admin.
    fn parent_for(&self, request: &PendingActor) -> ActorAddress {
        let requester = request.for_actor.as_ref().and_then(|address| address.unique());
        match requester {
            Some(path)
                if request.global_name.is_none()
                    && self.is_local(&path)
                    && self.cells.contains_key(path.id()) =>
            {
                ActorAddress::Unique(path)
            }
            _ => self.admin_address(),
        }
    }

    pub(crate) fn answer_creation(&mut self, request: &PendingActor, sender: &ActorAddress, answer: CreationResult) {
        let response = match answer {
            Ok(path) => PendingActorResponse::success(request, ActorAddress::Unique(path)),
            Err((error, detail)) => {
                debug!(self.log, "Creation of {} failed: {} ({})", request.class_name, error, detail);
                PendingActorResponse::failure(request, error, detail)
            }
        };
        let to = request.for_actor.clone().unwrap_or_else(|| sender.clone());
        self.send_from(
            Uuid::nil(),
            &to,
            Message::PendingActorResponse(response),
            Vec::new(),
        );
    }
}
