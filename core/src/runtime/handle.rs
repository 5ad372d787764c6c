use crate::{actors::ActorAddress, messaging::Message};
use crossbeam_channel::Sender;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A request from outside the event loop
#[derive(Debug)]
pub(crate) enum HandleRequest {
    Tell {
        target: ActorAddress,
        message: Message,
    },
    Shutdown,
}

/// A cloneable, thread-safe way into a running [ActorSystem](super::ActorSystem)
///
/// Requests are picked up the next time the system steps its event loop.
/// Messages sent through a handle come from the system's external address.
#[derive(Clone)]
pub struct SystemHandle {
    requests: Sender<HandleRequest>,
    shutdown: Arc<AtomicBool>,
}

impl SystemHandle {
    pub(crate) fn new(requests: Sender<HandleRequest>, shutdown: Arc<AtomicBool>) -> Self {
        SystemHandle { requests, shutdown }
    }

    /// Send `message` to `target`
    ///
    /// Returns `false` if the system is gone.
    pub fn tell(&self, target: &ActorAddress, message: Message) -> bool {
        self.requests
            .send(HandleRequest::Tell {
                target: target.clone(),
                message,
            })
            .is_ok()
    }

    /// Ask the system to shut down
    pub fn request_shutdown(&self) -> bool {
        self.shutdown.store(true, Ordering::SeqCst);
        self.requests.send(HandleRequest::Shutdown).is_ok()
    }

    /// Flag the system for shutdown without touching any lock or allocation
    ///
    /// Safe to call from a signal handler.
    pub fn shutdown_flag(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SystemHandle{{shutdown_requested={}}}",
            self.is_shutdown_requested()
        )
    }
}
