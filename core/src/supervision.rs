//! The lifecycle and failure handling of a single actor.
//!
//! A [Supervisor](Supervisor) tracks where an actor is in its life and which children
//! it still has to wait for before it may go. Handler failures are folded into an
//! [Outcome](Outcome) by [deliver](deliver), which retries a failing message once
//! and then gives up on it.

use crate::{
    actors::{ActorError, Handled, UniquePath},
    messaging::Message,
};
use std::collections::BTreeSet;

/// Where an actor is in its life
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Instantiated, but no message has been handled yet
    Created,
    Running,
    /// Waiting for its children to exit
    Exiting,
    Gone,
}

/// What to do after an exit request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitDecision {
    /// The actor is already on its way out, nothing to do.
    AlreadyExiting,
    /// The actor is gone now. Any `orphans` have to be adopted elsewhere.
    ExitNow { orphans: Vec<UniquePath> },
    /// Ask these children to exit and wait for them.
    Drain(Vec<UniquePath>),
}

/// Lifecycle state and children of one actor
#[derive(Clone, Debug)]
pub struct Supervisor {
    lifecycle: Lifecycle,
    children: BTreeSet<UniquePath>,
}

impl Supervisor {
    pub fn new() -> Self {
        Supervisor {
            lifecycle: Lifecycle::Created,
            children: BTreeSet::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Note that the first message is about to be handled
    pub fn start(&mut self) {
        if self.lifecycle == Lifecycle::Created {
            self.lifecycle = Lifecycle::Running;
        }
    }

    /// Returns `true` if the actor still accepts new children
    pub fn accepts_children(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Created | Lifecycle::Running)
    }

    /// Register a child
    ///
    /// Returns `false` if the actor is exiting, in which case the child should be
    /// asked to exit right away instead.
    pub fn add_child(&mut self, child: UniquePath) -> bool {
        if self.accepts_children() {
            self.children.insert(child);
            true
        } else {
            false
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &UniquePath> {
        self.children.iter()
    }

    pub fn has_child(&self, child: &UniquePath) -> bool {
        self.children.contains(child)
    }

    /// Handle an exit request
    ///
    /// A recursive exit waits for all children first. A non-recursive exit happens at once
    /// and hands the children back to the caller for adoption.
    pub fn request_exit(&mut self, recursive: bool) -> ExitDecision {
        match self.lifecycle {
            Lifecycle::Exiting | Lifecycle::Gone => ExitDecision::AlreadyExiting,
            Lifecycle::Created | Lifecycle::Running => {
                if !recursive {
                    let orphans = std::mem::take(&mut self.children).into_iter().collect();
                    self.lifecycle = Lifecycle::Gone;
                    ExitDecision::ExitNow { orphans }
                } else if self.children.is_empty() {
                    self.lifecycle = Lifecycle::Gone;
                    ExitDecision::ExitNow {
                        orphans: Vec::new(),
                    }
                } else {
                    self.lifecycle = Lifecycle::Exiting;
                    ExitDecision::Drain(self.children.iter().cloned().collect())
                }
            }
        }
    }

    /// Forget an exited child
    ///
    /// Returns `true` if this was the last child an exiting actor waited for,
    /// meaning the actor is gone now.
    pub fn child_exited(&mut self, child: &UniquePath) -> bool {
        let removed = self.children.remove(child);
        if removed && self.lifecycle == Lifecycle::Exiting && self.children.is_empty() {
            self.lifecycle = Lifecycle::Gone;
            true
        } else {
            false
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Supervisor::new()
    }
}

/// The result of handing one message to a handler
#[derive(Debug, PartialEq)]
pub enum Outcome<T> {
    /// Handled, with whatever the handler produced.
    Done(T),
    /// The handler asked to be stopped.
    Exit(T),
    /// The first attempt failed, try again with this untouched copy.
    Retry(Message),
    /// The message failed twice and goes back to its sender.
    Poison(Message),
    /// The message failed twice and is discarded.
    Dropped,
    /// The handler failed in a way that ends the actor.
    Fatal(String),
}

/// Run `handler` on `msg` once
///
/// `retried` says whether this is already the second attempt.
/// A [PoisonMessage](Message::PoisonMessage) that fails is dropped rather than poisoned again.
pub fn attempt<T, F>(handler: &mut F, msg: Message, retried: bool) -> Outcome<T>
where
    F: FnMut(Message) -> Result<(Handled, T), ActorError>,
{
    let copy = msg.clone();
    match handler(msg) {
        Ok((Handled::Ok, produced)) => Outcome::Done(produced),
        Ok((Handled::DieNow, produced)) => Outcome::Exit(produced),
        Err(ActorError::Fatal(reason)) => Outcome::Fatal(reason),
        Err(_) if !retried => Outcome::Retry(copy),
        Err(_) => match copy {
            Message::PoisonMessage { .. } => Outcome::Dropped,
            original => Outcome::Poison(original),
        },
    }
}

/// Run `handler` on `msg`, retrying once on failure
///
/// The result is never [Retry](Outcome::Retry).
pub fn deliver<T, F>(mut handler: F, msg: Message) -> Outcome<T>
where
    F: FnMut(Message) -> Result<(Handled, T), ActorError>,
{
    match attempt(&mut handler, msg, false) {
        Outcome::Retry(copy) => attempt(&mut handler, copy, true),
        outcome => outcome,
    }
}
