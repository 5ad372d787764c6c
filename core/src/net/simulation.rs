//! An in-memory network for deterministic tests.
//!
//! All systems of a scenario share one [SimulationNetwork](SimulationNetwork).
//! Frames are delivered instantly into the receiver's inbox and only surface
//! when that system polls, so the order of events is fully controlled by whoever
//! steps the systems. Faults are injected per system.

use super::*;
use crate::messaging::WireFrame;
use rustc_hash::FxHashMap;
use std::{
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    rc::Rc,
};

/// A frame that went over the simulated wire
#[derive(Clone, Debug, PartialEq)]
pub struct SentFrame {
    pub from: SystemPath,
    pub to: SystemPath,
    pub conn: ConnectionId,
    pub seq: u64,
    pub frame: Bytes,
}

impl SentFrame {
    /// Decode the frame, if it is well-formed
    pub fn decode(&self) -> Option<WireFrame> {
        WireFrame::decode(&self.frame).ok()
    }
}

#[derive(Default)]
struct Endpoint {
    inbox: VecDeque<TransportEvent>,
    down: bool,
    blocked: bool,
    garble_acks: usize,
    drop_acks: usize,
}

#[derive(Default)]
struct NetworkState {
    endpoints: BTreeMap<SystemPath, Endpoint>,
    connections: FxHashMap<ConnectionId, (SystemPath, SystemPath)>,
    next_conn: u64,
    sent: Vec<SentFrame>,
}

/// Shared state of a simulated network
#[derive(Clone, Default)]
pub struct SimulationNetwork {
    state: Rc<RefCell<NetworkState>>,
}

impl SimulationNetwork {
    pub fn new() -> Self {
        SimulationNetwork::default()
    }

    /// Attach a system to the network and return its transport
    pub fn transport(&self, system: SystemPath) -> SimulationTransport {
        self.state
            .borrow_mut()
            .endpoints
            .entry(system.clone())
            .or_default();
        SimulationTransport {
            local: system,
            network: self.clone(),
        }
    }

    /// A system that is down refuses connections and frames
    pub fn set_down(&self, system: &SystemPath, down: bool) {
        if let Some(ep) = self.state.borrow_mut().endpoints.get_mut(system) {
            ep.down = down;
        }
    }

    /// A blocked system makes connects and sends to it report `WouldBlock`
    pub fn set_blocked(&self, system: &SystemPath, blocked: bool) {
        if let Some(ep) = self.state.borrow_mut().endpoints.get_mut(system) {
            ep.blocked = blocked;
        }
    }

    /// The next `n` acknowledgements addressed to `system` arrive garbled
    pub fn garble_acks(&self, system: &SystemPath, n: usize) {
        if let Some(ep) = self.state.borrow_mut().endpoints.get_mut(system) {
            ep.garble_acks += n;
        }
    }

    /// The next `n` acknowledgements addressed to `system` are lost
    pub fn drop_acks(&self, system: &SystemPath, n: usize) {
        if let Some(ep) = self.state.borrow_mut().endpoints.get_mut(system) {
            ep.drop_acks += n;
        }
    }

    /// Every frame sent so far
    pub fn sent(&self) -> Vec<SentFrame> {
        self.state.borrow().sent.clone()
    }

    /// Decoded frames sent from `from` to `to`
    pub fn frames_between(&self, from: &SystemPath, to: &SystemPath) -> Vec<WireFrame> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter(|f| &f.from == from && &f.to == to)
            .filter_map(SentFrame::decode)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// Returns `true` if no system has undelivered events
    pub fn is_idle(&self) -> bool {
        self.state
            .borrow()
            .endpoints
            .values()
            .all(|ep| ep.inbox.is_empty())
    }

    fn push(&self, to: &SystemPath, event: TransportEvent) {
        if let Some(ep) = self.state.borrow_mut().endpoints.get_mut(to) {
            ep.inbox.push_back(event);
        }
    }
}

/// One system's view of a [SimulationNetwork](SimulationNetwork)
pub struct SimulationTransport {
    local: SystemPath,
    network: SimulationNetwork,
}

impl SimulationTransport {
    pub fn network(&self) -> &SimulationNetwork {
        &self.network
    }
}

impl Transport for SimulationTransport {
    fn local_system(&self) -> &SystemPath {
        &self.local
    }

    fn connect(&mut self, to: &SystemPath) -> Result<ConnectionId, TransportError> {
        let mut state = self.network.state.borrow_mut();
        match state.endpoints.get(to) {
            None => return Err(TransportError::Refused),
            Some(ep) if ep.down => return Err(TransportError::Refused),
            Some(ep) if ep.blocked => return Err(TransportError::WouldBlock),
            Some(_) => (),
        }
        state.next_conn += 1;
        let conn = ConnectionId(state.next_conn);
        state
            .connections
            .insert(conn, (self.local.clone(), to.clone()));
        Ok(conn)
    }

    fn send(&mut self, conn: ConnectionId, seq: u64, frame: Bytes) -> Result<(), TransportError> {
        let to = {
            let mut state = self.network.state.borrow_mut();
            let to = match state.connections.get(&conn) {
                Some((_, to)) => to.clone(),
                None => return Err(TransportError::Reset),
            };
            let (exists, down, blocked) = match state.endpoints.get(&to) {
                Some(ep) => (true, ep.down, ep.blocked),
                None => (false, false, false),
            };
            if !exists || down {
                state.connections.remove(&conn);
                return Err(TransportError::Refused);
            }
            if blocked {
                return Err(TransportError::WouldBlock);
            }
            state.sent.push(SentFrame {
                from: self.local.clone(),
                to: to.clone(),
                conn,
                seq,
                frame: frame.clone(),
            });
            to
        };
        self.network.push(
            &to,
            TransportEvent::Received {
                conn,
                seq,
                payload: frame,
            },
        );
        Ok(())
    }

    fn acknowledge(&mut self, conn: ConnectionId, seq: u64, status: AckStatus) {
        let mut state = self.network.state.borrow_mut();
        let from = match state.connections.get(&conn) {
            Some((from, _)) => from.clone(),
            None => return,
        };
        if let Some(ep) = state.endpoints.get_mut(&from) {
            if ep.drop_acks > 0 {
                ep.drop_acks -= 1;
            } else if ep.garble_acks > 0 {
                ep.garble_acks -= 1;
                ep.inbox.push_back(TransportEvent::Garbled { conn, seq });
            } else {
                ep.inbox
                    .push_back(TransportEvent::Acked { conn, seq, status });
            }
        }
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        self.network.state.borrow_mut().connections.remove(&conn);
    }

    fn poll(&mut self, _max_wait: Duration) -> Vec<TransportEvent> {
        let mut state = self.network.state.borrow_mut();
        match state.endpoints.get_mut(&self.local) {
            Some(ep) => ep.inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn probe(&mut self, to: &SystemPath) -> bool {
        self.network
            .state
            .borrow()
            .endpoints
            .get(to)
            .map(|ep| !ep.down)
            .unwrap_or(false)
    }
}
