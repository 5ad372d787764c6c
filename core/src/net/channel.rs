//! An in-process transport over crossbeam channels.
//!
//! Each attached system owns the receiving end of a channel, so systems can run their
//! event loops on separate threads and still only ever meet through the transport.

use super::*;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rustc_hash::FxHashMap;
use crate::actors::Protocol;
use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
        OnceLock,
    },
};

const FIRST_FREE_PORT: u16 = 1024;

enum Packet {
    Frame {
        conn: ConnectionId,
        seq: u64,
        from: SystemPath,
        payload: Bytes,
    },
    Ack {
        conn: ConnectionId,
        seq: u64,
        status: AckStatus,
    },
}

/// The registry shared by all [ChannelTransport](ChannelTransport)s of a process
#[derive(Clone, Default)]
pub struct ChannelNetwork {
    registry: Arc<Mutex<FxHashMap<SystemPath, Sender<Packet>>>>,
    next_conn: Arc<AtomicU64>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        ChannelNetwork::default()
    }

    /// Attach a system and return its transport
    ///
    /// Attaching the same system again replaces the previous attachment.
    pub fn transport(&self, system: SystemPath) -> ChannelTransport {
        let (tx, rx) = unbounded();
        if let Ok(mut registry) = self.registry.lock() {
            registry.insert(system.clone(), tx);
        }
        ChannelTransport {
            local: system,
            network: self.clone(),
            inbox: rx,
            outbound: FxHashMap::default(),
            inbound: FxHashMap::default(),
        }
    }

    /// Attach a system on `protocol` and `address` under the lowest port nobody uses yet
    pub fn transport_on_free_port(&self, protocol: Protocol, address: IpAddr) -> ChannelTransport {
        let system = match self.registry.lock() {
            Ok(registry) => (FIRST_FREE_PORT..=u16::MAX)
                .map(|port| SystemPath::new(protocol, address, port))
                .find(|candidate| !registry.contains_key(candidate)),
            Err(_) => None,
        }
        .unwrap_or_else(|| SystemPath::new(protocol, address, FIRST_FREE_PORT));
        self.transport(system)
    }

    /// The network shared by every system of this process that was not given a transport
    pub fn process_wide() -> ChannelNetwork {
        static NETWORK: OnceLock<ChannelNetwork> = OnceLock::new();
        NETWORK.get_or_init(ChannelNetwork::new).clone()
    }

    fn sender(&self, system: &SystemPath) -> Option<Sender<Packet>> {
        self.registry
            .lock()
            .ok()
            .and_then(|registry| registry.get(system).cloned())
    }
}

/// One system's endpoint on a [ChannelNetwork](ChannelNetwork)
pub struct ChannelTransport {
    local: SystemPath,
    network: ChannelNetwork,
    inbox: Receiver<Packet>,
    outbound: FxHashMap<ConnectionId, Sender<Packet>>,
    inbound: FxHashMap<ConnectionId, SystemPath>,
}

impl ChannelTransport {
    fn convert(&mut self, packet: Packet) -> TransportEvent {
        match packet {
            Packet::Frame {
                conn,
                seq,
                from,
                payload,
            } => {
                self.inbound.insert(conn, from);
                TransportEvent::Received { conn, seq, payload }
            }
            Packet::Ack { conn, seq, status } => TransportEvent::Acked { conn, seq, status },
        }
    }
}

impl Transport for ChannelTransport {
    fn local_system(&self) -> &SystemPath {
        &self.local
    }

    fn connect(&mut self, to: &SystemPath) -> Result<ConnectionId, TransportError> {
        let sender = self.network.sender(to).ok_or(TransportError::Refused)?;
        let conn = ConnectionId(self.network.next_conn.fetch_add(1, Ordering::SeqCst) + 1);
        self.outbound.insert(conn, sender);
        Ok(conn)
    }

    fn send(&mut self, conn: ConnectionId, seq: u64, frame: Bytes) -> Result<(), TransportError> {
        let sender = self.outbound.get(&conn).ok_or(TransportError::Reset)?;
        let packet = Packet::Frame {
            conn,
            seq,
            from: self.local.clone(),
            payload: frame,
        };
        if sender.send(packet).is_err() {
            self.outbound.remove(&conn);
            return Err(TransportError::Refused);
        }
        Ok(())
    }

    fn acknowledge(&mut self, conn: ConnectionId, seq: u64, status: AckStatus) {
        if let Some(sender) = self
            .inbound
            .get(&conn)
            .and_then(|from| self.network.sender(from))
        {
            let _ = sender.send(Packet::Ack { conn, seq, status });
        }
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        self.outbound.remove(&conn);
    }

    fn poll(&mut self, max_wait: Duration) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        match self.inbox.recv_timeout(max_wait) {
            Ok(packet) => {
                let event = self.convert(packet);
                events.push(event);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events
            }
        }
        let more: Vec<Packet> = self.inbox.try_iter().collect();
        for packet in more {
            let event = self.convert(packet);
            events.push(event);
        }
        events
    }

    fn probe(&mut self, to: &SystemPath) -> bool {
        self.network.sender(to).is_some()
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.network.registry.lock() {
            registry.remove(&self.local);
        }
    }
}
