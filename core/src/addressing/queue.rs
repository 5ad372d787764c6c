use crate::actors::AddressKey;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Identifies one transmit intent for its whole lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentId(pub u64);

/// The result of [admit](PendingTransmits::admit)
#[derive(Debug, PartialEq)]
pub enum Admission<T> {
    /// Nothing else is in flight for this destination, transmit immediately.
    Transmit(T),
    /// The item waits behind earlier transmits (or behind address resolution).
    Queued,
}

type QueueId = u64;

struct DestinationQueue<T> {
    keys: Vec<AddressKey>,
    in_flight: Vec<IntentId>,
    waiting: VecDeque<(IntentId, T)>,
    blocked: bool,
}

impl<T> DestinationQueue<T> {
    fn new() -> Self {
        DestinationQueue {
            keys: Vec::new(),
            in_flight: Vec::new(),
            waiting: VecDeque::new(),
            blocked: false,
        }
    }
}

/// FIFO queues of transmits, one per destination
///
/// A destination may be known under several keys (placeholders and the address they
/// resolve to), all of which share one queue. Only the head of each queue is in flight,
/// unrelated destinations never wait for each other.
///
/// A queue created for an unresolved placeholder is *blocked*: it holds its items until
/// [merge_on_resolution](PendingTransmits::merge_on_resolution) or
/// [abandon](PendingTransmits::abandon) is called.
pub struct PendingTransmits<T> {
    aliases: FxHashMap<AddressKey, QueueId>,
    queues: FxHashMap<QueueId, DestinationQueue<T>>,
    membership: FxHashMap<IntentId, QueueId>,
    next_queue: QueueId,
}

impl<T> PendingTransmits<T> {
    pub fn new() -> Self {
        PendingTransmits {
            aliases: FxHashMap::default(),
            queues: FxHashMap::default(),
            membership: FxHashMap::default(),
            next_queue: 0,
        }
    }

    /// Add an item for the destination known under `keys`
    ///
    /// `resolved` states whether the destination can be transmitted to at all yet.
    pub fn admit(
        &mut self,
        keys: &[AddressKey],
        id: IntentId,
        item: T,
        resolved: bool,
    ) -> Admission<T> {
        let mut existing: Vec<QueueId> = Vec::new();
        for key in keys {
            if let Some(q) = self.aliases.get(key) {
                if !existing.contains(q) {
                    existing.push(*q);
                }
            }
        }
        let target = match existing.split_first() {
            Some((first, rest)) => {
                for other in rest {
                    self.absorb(*first, *other);
                }
                *first
            }
            None => {
                let q = self.next_queue;
                self.next_queue += 1;
                let mut queue = DestinationQueue::new();
                let admission = if resolved {
                    queue.in_flight.push(id);
                    Admission::Transmit(item)
                } else {
                    queue.blocked = true;
                    queue.waiting.push_back((id, item));
                    Admission::Queued
                };
                self.queues.insert(q, queue);
                self.alias_all(q, keys);
                self.membership.insert(id, q);
                return admission;
            }
        };
        self.alias_all(target, keys);
        self.membership.insert(id, target);
        if let Some(queue) = self.queues.get_mut(&target) {
            queue.waiting.push_back((id, item));
        }
        match self.release(target) {
            Some((_, item)) => Admission::Transmit(item),
            None => Admission::Queued,
        }
    }

    /// Mark `id` as finished and return the next item to transmit for its destination
    pub fn complete(&mut self, id: IntentId) -> Option<(IntentId, T)> {
        let q = self.membership.remove(&id)?;
        if let Some(queue) = self.queues.get_mut(&q) {
            queue.in_flight.retain(|i| *i != id);
        }
        self.release(q)
    }

    /// Merge the queue held for `placeholder` into the queue for `resolved`
    ///
    /// Unblocks the merged queue and returns its next item if nothing is in flight.
    pub fn merge_on_resolution(
        &mut self,
        placeholder: &AddressKey,
        resolved: &AddressKey,
    ) -> Option<(IntentId, T)> {
        let pq = *self.aliases.get(placeholder)?;
        let target = match self.aliases.get(resolved) {
            Some(rq) if *rq != pq => {
                let rq = *rq;
                self.absorb(rq, pq);
                rq
            }
            Some(_) => pq,
            None => {
                self.alias_all(pq, std::slice::from_ref(resolved));
                pq
            }
        };
        if let Some(queue) = self.queues.get_mut(&target) {
            queue.blocked = false;
        }
        self.release(target)
    }

    /// Give up on a blocked destination, returning everything it held
    ///
    /// Queues with items in flight are never abandoned.
    pub fn abandon(&mut self, key: &AddressKey) -> Vec<(IntentId, T)> {
        let q = match self.aliases.get(key) {
            Some(q) => *q,
            None => return Vec::new(),
        };
        let abandonable = self
            .queues
            .get(&q)
            .map(|queue| queue.blocked && queue.in_flight.is_empty())
            .unwrap_or(false);
        if !abandonable {
            return Vec::new();
        }
        match self.remove_queue(q) {
            Some(queue) => {
                for (id, _) in queue.waiting.iter() {
                    self.membership.remove(id);
                }
                queue.waiting.into_iter().collect()
            }
            None => Vec::new(),
        }
    }

    /// Remove and return every waiting item, leaving in-flight bookkeeping intact
    pub fn drain_waiting(&mut self) -> Vec<(IntentId, T)> {
        let mut drained = Vec::new();
        for queue in self.queues.values_mut() {
            drained.extend(queue.waiting.drain(..));
        }
        for (id, _) in drained.iter() {
            self.membership.remove(id);
        }
        drained
    }

    /// Returns `true` if `key` belongs to a queue waiting for address resolution
    pub fn is_blocked(&self, key: &AddressKey) -> bool {
        self.aliases
            .get(key)
            .and_then(|q| self.queues.get(q))
            .map(|queue| queue.blocked)
            .unwrap_or(false)
    }

    /// Number of items in flight for the destination known as `key`
    pub fn in_flight(&self, key: &AddressKey) -> usize {
        self.aliases
            .get(key)
            .and_then(|q| self.queues.get(q))
            .map(|queue| queue.in_flight.len())
            .unwrap_or(0)
    }

    /// Total number of items in flight or waiting
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    fn alias_all(&mut self, q: QueueId, keys: &[AddressKey]) {
        for key in keys {
            if self.aliases.insert(key.clone(), q) != Some(q) {
                if let Some(queue) = self.queues.get_mut(&q) {
                    queue.keys.push(key.clone());
                }
            }
        }
    }

    fn absorb(&mut self, into: QueueId, from: QueueId) {
        let absorbed = match self.queues.remove(&from) {
            Some(queue) => queue,
            None => return,
        };
        for key in absorbed.keys.iter() {
            self.aliases.insert(key.clone(), into);
        }
        for id in absorbed
            .in_flight
            .iter()
            .chain(absorbed.waiting.iter().map(|(id, _)| id))
        {
            self.membership.insert(*id, into);
        }
        if let Some(queue) = self.queues.get_mut(&into) {
            queue.keys.extend(absorbed.keys);
            queue.in_flight.extend(absorbed.in_flight);
            queue.waiting.extend(absorbed.waiting);
            queue.blocked = queue.blocked && absorbed.blocked;
        }
    }

    fn release(&mut self, q: QueueId) -> Option<(IntentId, T)> {
        let (next, now_empty) = {
            let queue = self.queues.get_mut(&q)?;
            if queue.blocked || !queue.in_flight.is_empty() {
                return None;
            }
            match queue.waiting.pop_front() {
                Some((id, item)) => {
                    queue.in_flight.push(id);
                    (Some((id, item)), false)
                }
                None => (None, true),
            }
        };
        if now_empty {
            self.remove_queue(q);
        }
        next
    }

    fn remove_queue(&mut self, q: QueueId) -> Option<DestinationQueue<T>> {
        let queue = self.queues.remove(&q)?;
        for key in queue.keys.iter() {
            if self.aliases.get(key) == Some(&q) {
                self.aliases.remove(key);
            }
        }
        Some(queue)
    }
}

impl<T> Default for PendingTransmits<T> {
    fn default() -> Self {
        PendingTransmits::new()
    }
}
