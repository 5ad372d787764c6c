//! The transport seam between the transmission core and the network.
//!
//! A [Transport](Transport) moves opaque frames between systems and reports what
//! happened to them as [TransportEvent](TransportEvent)s. It knows nothing about
//! actors, retries or ordering, those live in [transmit](crate::transmit).
//! Every frame delivered to a peer must be acknowledged by that peer's runtime,
//! a send only counts as done once the acknowledgement is back.

use crate::actors::{AddressParseError, SystemPath, UniquePath};
use bytes::Bytes;
use std::{error::Error, fmt, time::Duration};

pub mod channel;
pub mod simulation;

/// A connection handle, meaningful only to the transport that issued it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// How the receiving runtime judged a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    /// Delivered to its target
    Ok,
    /// The frame could not be decoded
    BadPacket,
    /// The target does not exist on the receiving system
    DeadTarget,
}

/// Something the transport observed since the last poll
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A frame from a peer, to be acknowledged with `conn` and `seq`.
    Received {
        conn: ConnectionId,
        seq: u64,
        payload: Bytes,
    },
    /// A peer acknowledged one of our frames.
    Acked {
        conn: ConnectionId,
        seq: u64,
        status: AckStatus,
    },
    /// An acknowledgement arrived but could not be read.
    Garbled { conn: ConnectionId, seq: u64 },
    /// The connection went away, outstanding frames on it are lost.
    Closed { conn: ConnectionId },
}

/// Transport failures as seen by the transmission core
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// Not possible right now, try again later
    WouldBlock,
    /// The peer actively refused, it is gone
    Refused,
    /// The connection broke
    Reset,
}

impl TransportError {
    /// Transient errors are retried, permanent ones are reported as dead targets
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Refused)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::WouldBlock => f.write_str("operation would block"),
            TransportError::Refused => f.write_str("connection refused"),
            TransportError::Reset => f.write_str("connection reset"),
        }
    }
}

impl Error for TransportError {}

/// A way to exchange frames with other systems
///
/// Implementations are driven from a single event loop and need not be thread-safe.
pub trait Transport {
    /// The address under which peers reach this system
    fn local_system(&self) -> &SystemPath;

    /// Open a connection to `to`
    fn connect(&mut self, to: &SystemPath) -> Result<ConnectionId, TransportError>;

    /// Hand a frame to the connection, tagged with `seq` for acknowledgement
    fn send(&mut self, conn: ConnectionId, seq: u64, frame: Bytes) -> Result<(), TransportError>;

    /// Acknowledge a received frame back to its sender
    fn acknowledge(&mut self, conn: ConnectionId, seq: u64, status: AckStatus);

    /// Drop a connection, e.g. after the peer left the convention
    fn disconnect(&mut self, conn: ConnectionId);

    /// Wait up to `max_wait` for events and return everything observed
    fn poll(&mut self, max_wait: Duration) -> Vec<TransportEvent>;

    /// Returns `true` if `to` looks reachable right now
    fn probe(&mut self, to: &SystemPath) -> bool;

    /// Parse an address string in this transport's format
    ///
    /// A bare system address denotes that system's admin.
    fn address_from_string(&self, s: &str) -> Result<UniquePath, AddressParseError> {
        if s.contains('#') {
            s.parse()
        } else {
            s.parse::<SystemPath>().map(|system| system.admin())
        }
    }
}
