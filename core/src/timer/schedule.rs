use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    time::Duration,
};
use uuid::Uuid;

/// A one-shot timeout registered by an actor
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledWakeup<P> {
    /// The actor to wake up.
    pub target: Uuid,
    /// The delay that was originally requested.
    pub delay: Duration,
    /// Opaque data handed back to the actor on expiry.
    pub payload: P,
}

struct Entry<T> {
    deadline: Duration,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Outstanding one-shot timeouts ordered by deadline
///
/// Entries with equal deadlines fire in the order they were scheduled.
pub struct WakeupSchedule<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T> WakeupSchedule<T> {
    pub fn new() -> Self {
        WakeupSchedule {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, deadline: Duration, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            deadline,
            seq,
            item,
        }));
    }

    /// Remove and return every entry whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: Duration) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if head.deadline > now {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry.item);
            }
        }
        due
    }

    /// Drop every entry for which `keep` returns `false`
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        let entries = std::mem::take(&mut self.heap).into_vec();
        self.heap = entries.into_iter().filter(|e| keep(&e.0.item)).collect();
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|e| e.0.deadline)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for WakeupSchedule<T> {
    fn default() -> Self {
        WakeupSchedule::new()
    }
}
