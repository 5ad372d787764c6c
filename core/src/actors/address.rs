use arc_swap::ArcSwapOption;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    cmp::Ordering,
    error::Error,
    fmt,
    hash::{Hash, Hasher},
    net::{AddrParseError, IpAddr, SocketAddr},
    str::FromStr,
    sync::Arc,
};
use uuid::Uuid;

const UNIQUE_PATH_SEP: char = '#';
const ROUTE_SEP: char = '@';

/// Transport protocol used to reach a [SystemPath](SystemPath)
///
/// # Note
///
/// [Transport](crate::net::Transport) implementations are not required to implement all protocols.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Local reflection only, no network messages involved
    Local,
    /// Send messages over TCP
    Tcp,
    /// Send messages as UDP datagrams
    Udp,
}

impl Protocol {
    /// Returns `true` if this is an instance of [Protocol::Local](Protocol::Local)
    pub fn is_local(&self) -> bool {
        matches!(*self, Protocol::Local)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Local => write!(fmt, "local"),
            Protocol::Tcp => write!(fmt, "tcp"),
            Protocol::Udp => write!(fmt, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Protocol, AddressParseError> {
        match s {
            "local" => Ok(Protocol::Local),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(AddressParseError::Protocol(other.to_string())),
        }
    }
}

/// Error type for parsing addresses from a string
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum AddressParseError {
    /// The format is wrong
    Form(String),
    /// The transport protocol was invalid
    Protocol(String),
    /// The network address was invalid
    Addr(AddrParseError),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::Form(s) => write!(fmt, "Invalid formatting: {}", s),
            AddressParseError::Protocol(p) => {
                write!(fmt, "Protocol must be one of [local,tcp,udp], got {}", p)
            }
            AddressParseError::Addr(e) => write!(fmt, "Could not parse address: {}", e),
        }
    }
}

impl Error for AddressParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AddressParseError::Addr(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AddrParseError> for AddressParseError {
    fn from(e: AddrParseError) -> AddressParseError {
        AddressParseError::Addr(e)
    }
}

/// The part of an address that refers to a whole actor system
///
/// As a URI, a `SystemPath` looks like `"tcp://127.0.0.1:1900"`, for example.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemPath {
    protocol: Protocol,
    address: IpAddr,
    port: u16,
}

impl SystemPath {
    /// Construct a new system path from individual parts
    pub fn new(protocol: Protocol, address: IpAddr, port: u16) -> SystemPath {
        SystemPath {
            protocol,
            address,
            port,
        }
    }

    /// Construct a new system path from a [SocketAddr](std::net::SocketAddr)
    pub fn with_socket(protocol: Protocol, socket: SocketAddr) -> SystemPath {
        SystemPath::new(protocol, socket.ip(), socket.port())
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn address(&self) -> &IpAddr {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// The address of the admin of this system
    pub fn admin(&self) -> UniquePath {
        UniquePath::new(self.clone(), Uuid::nil())
    }
}

impl fmt::Display for SystemPath {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}://{}", self.protocol, self.socket_address())
    }
}

impl FromStr for SystemPath {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, "://");
        match (parts.next(), parts.next()) {
            (Some(proto), Some(socket)) => {
                let protocol: Protocol = proto.parse()?;
                let socket = SocketAddr::from_str(socket)?;
                Ok(SystemPath::with_socket(protocol, socket))
            }
            _ => Err(AddressParseError::Form(s.to_string())),
        }
    }
}

/// A resolved address that identifies a concrete actor instance
///
/// A unique path may look like `"tcp://127.0.0.1:1900#1e555f40-de1d-4aee-8202-64fdc27edfa8"`.
/// The nil id denotes the admin of the system.
///
/// A path may carry a route: an ordered list of systems the message has to pass through
/// before it reaches `system`. In string form each hop follows an `@`.
/// Routes describe reachability only, they are ignored when comparing paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniquePath {
    system: SystemPath,
    id: Uuid,
    #[serde(default)]
    route: Vec<SystemPath>,
}

impl UniquePath {
    /// Construct a new unique path from parts
    pub fn new(system: SystemPath, id: Uuid) -> UniquePath {
        UniquePath {
            system,
            id,
            route: Vec::new(),
        }
    }

    /// The same path, but only reachable through `hops`
    pub fn via(mut self, hops: Vec<SystemPath>) -> UniquePath {
        self.route = hops;
        self
    }

    /// The same path without any route
    pub fn direct(&self) -> UniquePath {
        UniquePath::new(self.system.clone(), self.id)
    }

    pub fn system(&self) -> &SystemPath {
        &self.system
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn route(&self) -> &[SystemPath] {
        &self.route
    }

    /// Returns `true` if this is the address of a system's admin
    pub fn is_admin(&self) -> bool {
        self.id.is_nil()
    }
}

impl PartialEq for UniquePath {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system && self.id == other.id
    }
}
impl Eq for UniquePath {}

impl Hash for UniquePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for UniquePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for UniquePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.system
            .cmp(&other.system)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for UniquePath {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}{}{}", self.system, UNIQUE_PATH_SEP, self.id)?;
        for hop in self.route.iter() {
            write!(fmt, "{}{}", ROUTE_SEP, hop)?;
        }
        Ok(())
    }
}

impl FromStr for UniquePath {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hops = s.split(ROUTE_SEP);
        let base = hops
            .next()
            .ok_or_else(|| AddressParseError::Form(s.to_string()))?;
        let mut parts = base.splitn(2, UNIQUE_PATH_SEP);
        let (system, id) = match (parts.next(), parts.next()) {
            (Some(system), Some(id)) => (system, id),
            _ => return Err(AddressParseError::Form(s.to_string())),
        };
        let system: SystemPath = system.parse()?;
        let id = Uuid::from_str(id).map_err(|_parse_err| AddressParseError::Form(s.to_string()))?;
        let route = hops
            .map(SystemPath::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UniquePath { system, id, route })
    }
}

/// A placeholder for an actor whose location is not yet known
///
/// Placeholders are handed out by an [AddressManager](crate::addressing::AddressManager)
/// and are only meaningful to the actor that owns that manager.
/// Once the real location is learned the placeholder is bound to it, permanently.
#[derive(Clone)]
pub struct LocalAddress {
    owner: Uuid,
    instance: usize,
    resolved: Arc<ArcSwapOption<UniquePath>>,
}

impl LocalAddress {
    pub(crate) fn new(owner: Uuid, instance: usize, slot: Arc<ArcSwapOption<UniquePath>>) -> Self {
        LocalAddress {
            owner,
            instance,
            resolved: slot,
        }
    }

    /// The id of the actor whose address manager issued this placeholder
    pub fn owner(&self) -> &Uuid {
        &self.owner
    }

    /// The slot index in the owner's address manager
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// The resolved address, if already known
    pub fn resolved(&self) -> Option<UniquePath> {
        self.resolved.load_full().map(|p| (*p).clone())
    }
}

impl fmt::Debug for LocalAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "LocalAddress{{owner={}, instance={}, resolved={:?}}}",
            self.owner,
            self.instance,
            self.resolved()
        )
    }
}

/// The address of an actor, either resolved or a local placeholder
///
/// Equality unifies the two forms: a placeholder equals the resolved address it is bound to.
/// Placeholders issued by different owners are never equal to each other,
/// since no actor can see into another actor's address table.
///
/// `ActorAddress` deliberately does not implement `Hash`,
/// use [key](ActorAddress::key) to index maps.
#[derive(Clone, Debug)]
pub enum ActorAddress {
    /// A resolved address
    Unique(UniquePath),
    /// A placeholder issued by an address manager
    Local(LocalAddress),
}

/// A hashable identity for an [ActorAddress](ActorAddress)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressKey {
    Unique(UniquePath),
    Local { owner: Uuid, instance: usize },
}

impl ActorAddress {
    /// The resolved form of this address, if any
    pub fn unique(&self) -> Option<UniquePath> {
        match self {
            ActorAddress::Unique(path) => Some(path.clone()),
            ActorAddress::Local(local) => local.resolved(),
        }
    }

    /// Returns `true` if this is a placeholder, resolved or not
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ActorAddress::Local(_))
    }

    /// The key of this address in its own form, without following resolution
    pub fn key(&self) -> AddressKey {
        match self {
            ActorAddress::Unique(path) => AddressKey::Unique(path.clone()),
            ActorAddress::Local(local) => AddressKey::Local {
                owner: local.owner,
                instance: local.instance,
            },
        }
    }

    /// The key of the resolved form if known, otherwise of the placeholder itself
    pub fn resolved_key(&self) -> AddressKey {
        match self.unique() {
            Some(path) => AddressKey::Unique(path),
            None => self.key(),
        }
    }

    /// The system this address lives on, if it is known
    pub fn system(&self) -> Option<SystemPath> {
        self.unique().map(|p| p.system().clone())
    }
}

impl From<UniquePath> for ActorAddress {
    fn from(path: UniquePath) -> Self {
        ActorAddress::Unique(path)
    }
}

impl PartialEq for ActorAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ActorAddress::Unique(a), ActorAddress::Unique(b)) => a == b,
            (ActorAddress::Local(local), ActorAddress::Unique(path))
            | (ActorAddress::Unique(path), ActorAddress::Local(local)) => {
                local.resolved().as_ref() == Some(path)
            }
            (ActorAddress::Local(a), ActorAddress::Local(b)) => {
                if a.owner != b.owner {
                    false
                } else if a.instance == b.instance {
                    true
                } else {
                    match (a.resolved(), b.resolved()) {
                        (Some(x), Some(y)) => x == y,
                        _ => false,
                    }
                }
            }
        }
    }
}

impl PartialEq<UniquePath> for ActorAddress {
    fn eq(&self, other: &UniquePath) -> bool {
        self.unique().as_ref() == Some(other)
    }
}

impl fmt::Display for ActorAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorAddress::Unique(path) => write!(fmt, "{}", path),
            ActorAddress::Local(local) => match local.resolved() {
                Some(path) => write!(fmt, "{}", path),
                None => write!(fmt, "local:{}/{}", local.owner, local.instance),
            },
        }
    }
}

impl Serialize for ActorAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.unique() {
            Some(path) => path.serialize(serializer),
            None => Err(ser::Error::custom(
                "unresolved placeholder address cannot be transmitted",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for ActorAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        UniquePath::deserialize(deserializer)
            .map(ActorAddress::Unique)
            .map_err(|e| de::Error::custom(format!("invalid actor address: {}", e)))
    }
}
