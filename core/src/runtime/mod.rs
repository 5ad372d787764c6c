use crate::{actors::AddressParseError, config::ConfigError, TroupeLogger};
use slog::{o, Drain};
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        OnceLock,
    },
};

mod cells;
mod config;
mod handle;
mod outbound;
mod system;

pub use config::{keys, SystemConfig};
pub(crate) use config::RuntimeSettings;
pub use handle::SystemHandle;
pub(crate) use handle::HandleRequest;
pub use system::ActorSystem;
pub(crate) use system::{
    ActorCell,
    Authority,
    ConventionSend,
    CreationState,
    Delivery,
    Endpoint,
    ShutdownState,
};

static GLOBAL_SYSTEM_COUNT: AtomicUsize = AtomicUsize::new(0);

fn default_system_label() -> String {
    let system_count = GLOBAL_SYSTEM_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
    format!("troupe-system-{}", system_count)
}

static DEFAULT_ROOT_LOGGER: OnceLock<TroupeLogger> = OnceLock::new();

/// The process-wide logger used by systems that were not given one
pub fn default_logger() -> &'static TroupeLogger {
    DEFAULT_ROOT_LOGGER.get_or_init(|| {
        let decorator = slog_term::TermDecorator::new().stdout().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).chan_size(1024).build().fuse();
        slog::Logger::root_typed(
            Arc::new(drain),
            o!(
            "location" => slog::PushFnValue(|r: &slog::Record<'_>, ser: slog::PushFnValueSerializer<'_>| {
                ser.emit(format_args!("{}:{}", r.file(), r.line()))
            })
                    ),
        )
    })
}

/// A failure to set up or use an [ActorSystem](ActorSystem)
#[derive(Debug, Clone, PartialEq)]
pub enum SystemError {
    /// The HOCON sources could not be loaded
    Config(hocon::Error),
    /// A configured value is missing, malformed or illegal
    ConfigValue(ConfigError),
    /// A configured address could not be parsed
    Address(AddressParseError),
    /// The system has shut down
    ShutDown,
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Config(e) => write!(f, "Could not load config: {}", e),
            SystemError::ConfigValue(e) => write!(f, "{}", e),
            SystemError::Address(e) => write!(f, "Invalid address in config: {}", e),
            SystemError::ShutDown => f.write_str("The actor system has shut down"),
        }
    }
}

impl Error for SystemError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SystemError::Config(e) => Some(e),
            SystemError::ConfigValue(e) => Some(e),
            SystemError::Address(e) => Some(e),
            SystemError::ShutDown => None,
        }
    }
}

impl From<hocon::Error> for SystemError {
    fn from(e: hocon::Error) -> Self {
        SystemError::Config(e)
    }
}

impl From<ConfigError> for SystemError {
    fn from(e: ConfigError) -> Self {
        SystemError::ConfigValue(e)
    }
}

impl From<AddressParseError> for SystemError {
    fn from(e: AddressParseError) -> Self {
        SystemError::Address(e)
    }
}
