//! The closed set of messages exchanged by actors, admins and systems.
//!
//! Everything that travels through the transmission core is a [Message](Message).
//! Application data rides inside [Message::User](Message::User) as an opaque [Payload](Payload),
//! all other variants belong to the runtime's own protocols.

use crate::{
    actors::{ActorAddress, SystemPath, UniquePath},
    sources::SourceHash,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, error::Error, fmt, time::Duration};

/// A single advertised capability value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CapabilityValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for CapabilityValue {
    fn from(v: bool) -> Self {
        CapabilityValue::Bool(v)
    }
}
impl From<i64> for CapabilityValue {
    fn from(v: i64) -> Self {
        CapabilityValue::Int(v)
    }
}
impl From<f64> for CapabilityValue {
    fn from(v: f64) -> Self {
        CapabilityValue::Float(v)
    }
}
impl From<&str> for CapabilityValue {
    fn from(v: &str) -> Self {
        CapabilityValue::Str(v.to_string())
    }
}
impl From<String> for CapabilityValue {
    fn from(v: String) -> Self {
        CapabilityValue::Str(v)
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{}", b),
            CapabilityValue::Int(i) => write!(f, "{}", i),
            CapabilityValue::Float(x) => write!(f, "{}", x),
            CapabilityValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// The capabilities a system advertises to the convention
pub type Capabilities = BTreeMap<String, CapabilityValue>;

/// The capabilities an actor class asks of the system hosting it
pub type Requirements = Capabilities;

/// Build a capability map from `(name, value)` pairs
pub fn capabilities<I, K, V>(entries: I) -> Capabilities
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<CapabilityValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Returns `true` if every requirement is advertised with an equal value
pub fn satisfies(capabilities: &Capabilities, requirements: &Requirements) -> bool {
    requirements
        .iter()
        .all(|(name, wanted)| capabilities.get(name) == Some(wanted))
}

/// An error (de)serialising a [Payload](Payload) or a wire frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError(pub String);

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload serialisation failed: {}", self.0)
    }
}

impl Error for PayloadError {}

impl From<bincode::Error> for PayloadError {
    fn from(e: bincode::Error) -> Self {
        PayloadError(e.to_string())
    }
}

/// Application data carried by [Message::User](Message::User)
///
/// The `tag` lets receivers tell payload types apart before decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub tag: String,
    pub data: Bytes,
}

impl Payload {
    pub fn new<S: Into<String>>(tag: S, data: Bytes) -> Payload {
        Payload {
            tag: tag.into(),
            data,
        }
    }

    /// A payload holding UTF-8 text
    pub fn text<S: Into<String>>(tag: S, text: &str) -> Payload {
        Payload::new(tag, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// The payload as text, if it is valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Serialise `value` into a payload
    pub fn encode<S, T>(tag: S, value: &T) -> Result<Payload, PayloadError>
    where
        S: Into<String>,
        T: Serialize,
    {
        let data = bincode::serialize(value)?;
        Ok(Payload::new(tag, Bytes::from(data)))
    }

    /// Deserialise the payload's data
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        bincode::deserialize(&self.data).map_err(PayloadError::from)
    }
}

/// Error codes for failed actor creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingActorError {
    /// The system is shutting down and creates nothing new
    ShuttingDown,
    /// Neither this system nor any reachable convention member can host the actor
    NoCompatibleSystem,
    /// The referenced source hash is unknown or failed to load
    InvalidSourceHash,
    /// The class is not known under the given name
    InvalidActorClass,
    /// The class could not be produced from the loaded source
    ImportError,
    /// No answer arrived within the maximum creation delay
    Timeout,
}

impl fmt::Display for PendingActorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PendingActorError::ShuttingDown => "actor system is shutting down",
            PendingActorError::NoCompatibleSystem => "no compatible actor system",
            PendingActorError::InvalidSourceHash => "invalid source hash",
            PendingActorError::InvalidActorClass => "invalid actor class",
            PendingActorError::ImportError => "actor class import failed",
            PendingActorError::Timeout => "actor creation timed out",
        };
        f.write_str(s)
    }
}

impl Error for PendingActorError {}

/// Convention registration of one system with another
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub admin: ActorAddress,
    pub capabilities: Capabilities,
    pub first_time: bool,
    pub pre_register: bool,
}

/// An admin-mediated actor creation request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingActor {
    pub class_name: String,
    /// The actor that asked for the child, it receives the response.
    pub for_actor: Option<ActorAddress>,
    /// The placeholder instance in the requester's address manager.
    pub instance: usize,
    pub requirements: Option<Requirements>,
    pub global_name: Option<String>,
    pub source_hash: Option<SourceHash>,
    /// Admins that have already been asked, in order.
    pub already_tried: Vec<ActorAddress>,
}

/// The answer to a [PendingActor](PendingActor) request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingActorResponse {
    pub for_actor: Option<ActorAddress>,
    pub instance: usize,
    pub global_name: Option<String>,
    pub error: Option<PendingActorError>,
    pub error_str: Option<String>,
    pub actual_address: Option<ActorAddress>,
}

impl PendingActorResponse {
    pub(crate) fn success(request: &PendingActor, address: ActorAddress) -> Self {
        PendingActorResponse {
            for_actor: request.for_actor.clone(),
            instance: request.instance,
            global_name: request.global_name.clone(),
            error: None,
            error_str: None,
            actual_address: Some(address),
        }
    }

    pub(crate) fn failure<S: Into<String>>(
        request: &PendingActor,
        error: PendingActorError,
        detail: S,
    ) -> Self {
        PendingActorResponse {
            for_actor: request.for_actor.clone(),
            instance: request.instance,
            global_name: request.global_name.clone(),
            error: Some(error),
            error_str: Some(detail.into()),
            actual_address: None,
        }
    }
}

/// Every message known to the runtime
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Application data.
    User(Payload),
    ActorExitRequest {
        recursive: bool,
    },
    ChildActorExited {
        child: ActorAddress,
    },
    /// Delivered to a requester whose child could not be created.
    ChildCreationFailed {
        child: ActorAddress,
        error: PendingActorError,
        detail: String,
    },
    /// A message whose handler failed twice, returned to its sender.
    PoisonMessage {
        original: Box<Message>,
    },
    DeadEnvelope {
        dead_address: ActorAddress,
        message: Box<Message>,
    },
    WakeupMessage {
        delay: Duration,
        payload: Option<Payload>,
    },
    Register(Register),
    DeRegister {
        admin: ActorAddress,
        pre_registered: bool,
    },
    Invite,
    QueryExists,
    QueryAck {
        system_name: String,
        system_version: String,
        in_shutdown: bool,
    },
    PendingActor(PendingActor),
    PendingActorResponse(PendingActorResponse),
    ValidateSource {
        hash: SourceHash,
        bytes: Option<Bytes>,
        info: Option<String>,
    },
    ValidatedSource {
        hash: SourceHash,
        bytes: Bytes,
        info: Option<String>,
    },
    LoadSource {
        bytes: Bytes,
        info: Option<String>,
    },
    UnloadSource {
        hash: SourceHash,
    },
    SourceHashTransferRequest {
        hash: SourceHash,
        prefer_original: bool,
    },
    SourceHashTransferReply {
        hash: SourceHash,
        bytes: Option<Bytes>,
        info: Option<String>,
        checksum: Option<u32>,
    },
    CapabilityUpdate {
        name: String,
        value: Option<CapabilityValue>,
    },
    NewCapabilities {
        capabilities: Capabilities,
        admin: ActorAddress,
    },
    SystemShutdown,
    SystemShutdownCompleted,
    NotifyOnSystemRegistration {
        enable: bool,
    },
    /// Sent to observers when a convention member joins or leaves.
    ConventionUpdate {
        remote_admin: ActorAddress,
        capabilities: Capabilities,
        added: bool,
    },
    DeadLetterHandler {
        enable: bool,
    },
    RegisterSourceAuthority,
    PreRegisterSystem {
        remote_admin: ActorAddress,
    },
    /// A message on its way through intermediate systems.
    Forward {
        target: UniquePath,
        hops: Vec<SystemPath>,
        sender: ActorAddress,
        message: Box<Message>,
    },
}

impl Message {
    /// A user message holding text
    pub fn text<S: Into<String>>(tag: S, text: &str) -> Message {
        Message::User(Payload::text(tag, text))
    }

    /// The variant name, used for logging and for coalescing sends by type
    pub fn kind(&self) -> &'static str {
        match self {
            Message::User(_) => "User",
            Message::ActorExitRequest { .. } => "ActorExitRequest",
            Message::ChildActorExited { .. } => "ChildActorExited",
            Message::ChildCreationFailed { .. } => "ChildCreationFailed",
            Message::PoisonMessage { .. } => "PoisonMessage",
            Message::DeadEnvelope { .. } => "DeadEnvelope",
            Message::WakeupMessage { .. } => "WakeupMessage",
            Message::Register(_) => "Register",
            Message::DeRegister { .. } => "DeRegister",
            Message::Invite => "Invite",
            Message::QueryExists => "QueryExists",
            Message::QueryAck { .. } => "QueryAck",
            Message::PendingActor(_) => "PendingActor",
            Message::PendingActorResponse(_) => "PendingActorResponse",
            Message::ValidateSource { .. } => "ValidateSource",
            Message::ValidatedSource { .. } => "ValidatedSource",
            Message::LoadSource { .. } => "LoadSource",
            Message::UnloadSource { .. } => "UnloadSource",
            Message::SourceHashTransferRequest { .. } => "SourceHashTransferRequest",
            Message::SourceHashTransferReply { .. } => "SourceHashTransferReply",
            Message::CapabilityUpdate { .. } => "CapabilityUpdate",
            Message::NewCapabilities { .. } => "NewCapabilities",
            Message::SystemShutdown => "SystemShutdown",
            Message::SystemShutdownCompleted => "SystemShutdownCompleted",
            Message::NotifyOnSystemRegistration { .. } => "NotifyOnSystemRegistration",
            Message::ConventionUpdate { .. } => "ConventionUpdate",
            Message::DeadLetterHandler { .. } => "DeadLetterHandler",
            Message::RegisterSourceAuthority => "RegisterSourceAuthority",
            Message::PreRegisterSystem { .. } => "PreRegisterSystem",
            Message::Forward { .. } => "Forward",
        }
    }

    /// Messages that must never be wrapped into a [DeadEnvelope](Message::DeadEnvelope)
    pub fn is_dead_letter_notice(&self) -> bool {
        matches!(
            self,
            Message::DeadEnvelope { .. } | Message::ChildActorExited { .. }
        )
    }

    /// The address embedded in a dead-letter envelope, if this is one
    pub fn dead_address(&self) -> Option<&ActorAddress> {
        match self {
            Message::DeadEnvelope { dead_address, .. } => Some(dead_address),
            _ => None,
        }
    }
}

/// A message together with the address it came from
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub sender: ActorAddress,
    pub message: Message,
}

/// The unit handed to a [Transport](crate::net::Transport)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub sender: ActorAddress,
    pub target: UniquePath,
    pub message: Message,
}

impl WireFrame {
    pub fn encode(&self) -> Result<Bytes, PayloadError> {
        let data = bincode::serialize(self)?;
        Ok(Bytes::from(data))
    }

    pub fn decode(data: &[u8]) -> Result<WireFrame, PayloadError> {
        bincode::deserialize(data).map_err(PayloadError::from)
    }
}
