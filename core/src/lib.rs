//! Troupe is an actor runtime in which independent actors talk only through messages,
//! live in a supervision tree, and may be spread over several systems that organise
//! themselves into a *convention* around a leader.
//!
//! A system is a single-threaded event loop. It resolves addresses that are handed out
//! before the actor behind them exists, keeps messages to one destination in order,
//! retries transmits with backoff, places actors on whichever convention member has the
//! capabilities they ask for, and distributes validated source blobs between members.
//!
//! To get all troupe related things into scope import `use troupe::prelude::*;`.
//!
//! # Example
//!
//! ```
//! use troupe::prelude::*;
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! impl Actor for Echo {
//!     fn receive(
//!         &mut self,
//!         ctx: &mut ActorContext<'_>,
//!         sender: &ActorAddress,
//!         msg: Message,
//!     ) -> Result<Handled, ActorError> {
//!         if let Message::User(payload) = msg {
//!             ctx.tell(sender, payload);
//!         }
//!         Ok(Handled::Ok)
//!     }
//! }
//!
//! let mut conf = SystemConfig::default();
//! conf.register_class(SimpleClass::new("Echo", || Box::new(Echo) as Box<dyn Actor>).shared());
//! let mut system = conf.build().expect("system");
//! let echo = system.create_actor(CreateRequest::new("Echo")).expect("echo");
//! let reply = system
//!     .ask(&echo, Message::text("greeting", "hello"), Duration::from_secs(1))
//!     .expect("ask")
//!     .expect("reply");
//! assert_eq!(Message::text("greeting", "hello"), reply.message);
//! system.shutdown();
//! ```

#[macro_use]
pub mod config;

pub mod actors;
mod admin;
pub mod addressing;
pub mod convention;
pub mod messaging;
pub mod net;
pub mod runtime;
pub mod simulation;
pub mod sources;
pub mod supervision;
pub mod timer;
pub mod transmit;

use slog::{Fuse, Logger};
use slog_async::Async;
use std::sync::Arc;

/// The logger type used throughout troupe
pub type TroupeLogger = Logger<Arc<Fuse<Async>>>;

/// The config keys understood by a [SystemConfig](runtime::SystemConfig)
pub use runtime::keys as config_keys;

/// To get all troupe related things into scope import `use troupe::prelude::*`.
pub mod prelude {
    pub use slog::{crit, debug, error, info, o, trace, warn, Drain, Fuse, Logger};

    pub use bytes::Bytes;

    pub use crate::{
        actors::{
            Actor,
            ActorAddress,
            ActorClass,
            ActorContext,
            ActorError,
            ClassRegistry,
            CreateRequest,
            Handled,
            ModuleProvider,
            Protocol,
            SimpleClass,
            SystemPath,
            UniquePath,
        },
        messaging::{
            capabilities,
            Capabilities,
            CapabilityValue,
            Envelope,
            Message,
            Payload,
            PendingActorError,
            Requirements,
        },
        runtime::{default_logger, ActorSystem, SystemConfig, SystemError, SystemHandle},
        sources::{SourceAuthority, SourceHash},
        timer::{Clock, SimulationClock, SystemClock},
        TroupeLogger,
    };
}
