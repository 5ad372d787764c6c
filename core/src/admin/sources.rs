use crate::{
    actors::ActorAddress,
    messaging::{Message, PendingActorError},
    runtime::{ActorSystem, Authority},
    sources::{fletcher32, SourceHash, SourceState},
};
use bytes::Bytes;
use slog::{debug, info, warn};
use uuid::Uuid;

enum Validation {
    Verdict(Option<Bytes>),
    Ask(ActorAddress),
}

impl ActorSystem {
    pub(crate) fn load_source_bytes(&mut self, bytes: Bytes, info: Option<String>) {
        if matches!(self.authority, Authority::Unset) {
            warn!(
                self.log,
                "Ignoring source of {} bytes, no source authority is registered",
                bytes.len()
            );
            return;
        }
        let (hash, fresh) = self.sources.begin_load(bytes.clone(), info.clone());
        if !fresh {
            debug!(self.log, "Source {} is already known", hash);
            return;
        }
        let validation = match &mut self.authority {
            Authority::Unset => return,
            Authority::Local(authority) => match authority.validate(&hash, &bytes, info.as_deref()) {
                Ok(validated) if !validated.is_empty() => Validation::Verdict(Some(validated)),
                Ok(_) => Validation::Verdict(None),
                Err(reason) => {
                    warn!(self.log, "Source {} rejected: {}", hash, reason);
                    Validation::Verdict(None)
                }
            },
            Authority::Actor(authority) => Validation::Ask(authority.clone()),
        };
        match validation {
            Validation::Verdict(verdict) => self.source_verdict(hash, verdict, info),
            Validation::Ask(authority) => {
                debug!(self.log, "Asking {} to validate source {}", authority, hash);
                self.send_from(
                    Uuid::nil(),
                    &authority,
                    Message::ValidateSource {
                        hash,
                        bytes: Some(bytes),
                        info,
                    },
                    Vec::new(),
                );
            }
        }
    }

    fn source_verdict(&mut self, hash: SourceHash, verdict: Option<Bytes>, info: Option<String>) {
        match verdict {
            Some(bytes) => {
                info!(self.log, "Source {} loaded", hash);
                for (request, sender) in self.sources.validated(&hash, bytes, info) {
                    self.handle_pending_actor(sender, request);
                }
            }
            None => {
                warn!(self.log, "Source {} was not accepted", hash);
                for (request, sender) in self.sources.rejected(&hash) {
                    let answer = Err((
                        PendingActorError::InvalidSourceHash,
                        format!("source {} was rejected", hash),
                    ));
                    self.answer_creation(&request, &sender, answer);
                }
            }
        }
    }

    pub(crate) fn source_validated(
        &mut self,
        sender: &ActorAddress,
        hash: SourceHash,
        bytes: Bytes,
        info: Option<String>,
    ) {
        let from_authority = matches!(&self.authority, Authority::Actor(authority) if authority == sender);
        if !from_authority {
            warn!(self.log, "Ignoring validation of {} by {}, not the source authority", hash, sender);
            return;
        }
        if self.sources.status(&hash) != SourceState::Validating {
            debug!(self.log, "Ignoring validation of {}, not waiting for it", hash);
            return;
        }
        let verdict = if bytes.is_empty() { None } else { Some(bytes) };
        self.source_verdict(hash, verdict, info);
    }

    pub(crate) fn register_authority(&mut self, authority: ActorAddress) {
        info!(self.log, "{} is the source authority", authority);
        self.authority = Authority::Actor(authority);
    }

    /// Drop `hash`, stop its actors and tell the convention
    ///
    /// A system that does not know the hash does nothing, which ends the fan-out.
    pub(crate) fn unload_source_hash(&mut self, sender: &ActorAddress, hash: SourceHash) {
        let (authority_local, instances) = match self.sources.unload(&hash) {
            Some(unloaded) => unloaded,
            None => {
                debug!(self.log, "Source {} is not loaded here", hash);
                return;
            }
        };
        info!(
            self.log,
            "Unloading source {}, stopping {} actors", hash, instances.len()
        );
        for instance in instances {
            self.send_from(
                Uuid::nil(),
                &ActorAddress::Unique(instance),
                Message::ActorExitRequest { recursive: true },
                Vec::new(),
            );
        }
        if authority_local {
            return;
        }
        let origin = sender.system();
        let now = self.now();
        for peer in self.convention.live_members(now) {
            if origin.as_ref() == Some(peer.system()) {
                continue;
            }
            self.send_from(
                Uuid::nil(),
                &ActorAddress::Unique(peer),
                Message::UnloadSource { hash: hash.clone() },
                Vec::new(),
            );
        }
    }

    pub(crate) fn transfer_request(&mut self, sender: ActorAddress, hash: SourceHash, prefer_original: bool) {
        let reply = match self.sources.bytes_for_transfer(&hash, prefer_original) {
            Some((bytes, info)) => {
                debug!(self.log, "Sending source {} to {}", hash, sender);
                let checksum = fletcher32(&bytes);
                Message::SourceHashTransferReply {
                    hash,
                    bytes: Some(bytes),
                    info,
                    checksum: Some(checksum),
                }
            }
            None => Message::SourceHashTransferReply {
                hash,
                bytes: None,
                info: None,
                checksum: None,
            },
        };
        self.send_from(Uuid::nil(), &sender, reply, Vec::new());
    }

    pub(crate) fn transfer_reply(
        &mut self,
        sender: &ActorAddress,
        hash: SourceHash,
        bytes: Option<Bytes>,
        info: Option<String>,
        checksum: Option<u32>,
    ) {
        let expected = self
            .sources
            .transfer_source(&hash)
            .map(|from| from.system().clone());
        if expected.is_none() || expected != sender.system() {
            debug!(self.log, "Ignoring unexpected transfer of {} from {}", hash, sender);
            return;
        }
        match self.sources.transfer_reply(&hash, bytes, info, checksum) {
            Ok(waiters) => {
                info!(self.log, "Source {} received from {}", hash, sender);
                for (request, sender) in waiters {
                    self.handle_pending_actor(sender, request);
                }
            }
            Err(waiters) => {
                warn!(self.log, "Transfer of source {} from {} failed", hash, sender);
                for (request, sender) in waiters {
                    let answer = Err((
                        PendingActorError::InvalidSourceHash,
                        format!("source {} could not be fetched", hash),
                    ));
                    self.answer_creation(&request, &sender, answer);
                }
            }
        }
    }
}
