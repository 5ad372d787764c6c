use super::*;

use crate::{
    actors::{ActorClass, ClassRegistry, ModuleProvider},
    config::{ConfigEntry, ConfigValueType},
    convention::{ConventionSettings, HysteresisSettings},
    messaging::Capabilities,
    net::Transport,
    sources::SourceAuthority,
    timer::Clock,
    transmit::TransmitSettings,
};
use hocon::{Hocon, HoconLoader};
use std::{path::PathBuf, time::Duration};

/// Configuration keys for troupe systems.
pub mod keys {
    use super::*;
    use crate::config::*;

    troupe_config! {
        LABEL,
        key = "troupe.system.label",
        type = StringValue,
        default = default_system_label(),
        doc = r#"The system label, attached to every log line of the system.

# Default

`troupe-system-` followed by a number unique to this process.
    "#,
        version = "0.1"
    }

    troupe_config! {
        VERSION,
        key = "troupe.system.version",
        type = StringValue,
        default = env!("CARGO_PKG_VERSION").to_string(),
        doc = "The version reported in answers to `QueryExists`.",
        version = "0.1"
    }

    troupe_config! {
        ADDRESS,
        key = "troupe.system.address",
        type = StringValue,
        default = "local://127.0.0.1:0".to_string(),
        doc = r#"The address of the system on the in-process channel network.

Only used when no transport is given to the [SystemConfig](crate::prelude::SystemConfig).
    "#,
        version = "0.1"
    }

    troupe_config! {
        CAPABILITIES,
        key = "troupe.system.capabilities",
        type = CapabilitiesValue,
        default = Capabilities::new(),
        doc = r#"The capabilities the system advertises to the convention.

A flat object of booleans, integers, reals and strings, e.g. `{ GPU: true, cores: 8 }`.
    "#,
        version = "0.1"
    }

    troupe_config! {
        TICK,
        key = "troupe.system.tick",
        type = DurationValue,
        default = Duration::from_secs(1),
        validate = |value| *value > Duration::ZERO,
        doc = "How often the admin checks convention liveness and expires dead addresses.",
        version = "0.1"
    }

    troupe_config! {
        MAX_DRAIN_PERIOD,
        key = "troupe.system.max-drain-period",
        type = DurationValue,
        default = Duration::from_secs(2),
        doc = "How long a shutting-down system waits for actors to exit and transmits to drain.",
        version = "0.1"
    }

    troupe_config! {
        MAX_CREATION_DELAY,
        key = "troupe.system.max-creation-delay",
        type = DurationValue,
        default = Duration::from_secs(30),
        validate = |value| *value > Duration::ZERO,
        doc = r#"How long a requester waits for an admin-mediated creation.

When the delay passes without an answer, the requester gets a `ChildCreationFailed` with error `Timeout`.
    "#,
        version = "0.1"
    }

    troupe_config! {
        DEAD_ADDRESS_TIMEOUT,
        key = "troupe.system.dead-address-timeout",
        type = DurationValue,
        default = Duration::from_secs(10 * 60),
        doc = "How long an address stays marked dead without fresh evidence.",
        version = "0.1"
    }

    troupe_config! {
        CONVENTION_ADDRESSES,
        key = "troupe.convention.addresses",
        type = ArrayOfValues<StringValue>,
        default = Vec::new(),
        doc = r#"The leader candidates of the convention, highest priority first.

Each entry is a system address like `"tcp://10.0.0.1:1900"`.
An empty list means the system is not part of any convention.
    "#,
        version = "0.1"
    }

    troupe_config! {
        REREGISTRATION_PERIOD,
        key = "troupe.convention.reregistration-period",
        type = DurationValue,
        default = Duration::from_secs(7 * 60 + 22),
        validate = |value| *value > Duration::ZERO,
        doc = "How often a member registers with the convention leader.",
        version = "0.1"
    }

    troupe_config! {
        MISSED_CHECKINS,
        key = "troupe.convention.missed-checkins",
        type = UsizeValue,
        default = 3,
        validate = |value| *value > 0,
        doc = "Registrations a member may miss before the leader drops it.",
        version = "0.1"
    }

    troupe_config! {
        PING_FACTOR,
        key = "troupe.convention.preregistration-ping-factor",
        type = RealValue,
        default = 1.1,
        validate = |value| *value > 0.0,
        doc = "Pre-registered peers are invited every reregistration period times this factor.",
        version = "0.1"
    }

    troupe_config! {
        HYSTERESIS_MIN_DELAY,
        key = "troupe.convention.hysteresis.min-delay",
        type = DurationValue,
        default = Duration::from_millis(250),
        doc = "The initial blackout window after a convention send.",
        version = "0.1"
    }

    troupe_config! {
        HYSTERESIS_MAX_DELAY,
        key = "troupe.convention.hysteresis.max-delay",
        type = DurationValue,
        default = Duration::from_secs(45),
        doc = "The widest the blackout window can grow.",
        version = "0.1"
    }

    troupe_config! {
        HYSTERESIS_RATE,
        key = "troupe.convention.hysteresis.rate",
        type = RealValue,
        default = 1.2,
        validate = |value| *value > 1.0,
        doc = "The factor by which the blackout window grows and shrinks.",
        version = "0.1"
    }

    troupe_config! {
        MAX_RETRIES,
        key = "troupe.transmit.max-retries",
        type = UsizeValue,
        default = 20,
        doc = "How often a transmit is retried before it fails.",
        version = "0.1"
    }

    troupe_config! {
        TRANSMIT_TIMEOUT,
        key = "troupe.transmit.timeout",
        type = DurationValue,
        default = Duration::from_secs(5 * 60),
        validate = |value| *value > Duration::ZERO,
        doc = "The absolute lifetime of a transmit, whatever its retries.",
        version = "0.1"
    }

    troupe_config! {
        ACK_TIMEOUT,
        key = "troupe.transmit.ack-timeout",
        type = DurationValue,
        default = Duration::from_secs(10),
        validate = |value| *value > Duration::ZERO,
        doc = "How long a sent frame waits for its acknowledgement before it is retried.",
        version = "0.1"
    }

    troupe_config! {
        BACKOFF_MIN,
        key = "troupe.transmit.backoff.min",
        type = DurationValue,
        default = Duration::from_millis(20),
        doc = "The first retry delay.",
        version = "0.1"
    }

    troupe_config! {
        BACKOFF_FACTOR,
        key = "troupe.transmit.backoff.factor",
        type = RealValue,
        default = 1.7,
        validate = |value| *value >= 1.0,
        doc = "The factor by which consecutive retry delays grow.",
        version = "0.1"
    }

    troupe_config! {
        BACKOFF_MAX,
        key = "troupe.transmit.backoff.max",
        type = DurationValue,
        default = Duration::from_millis(7_300),
        doc = "The longest retry delay.",
        version = "0.1"
    }

    troupe_config! {
        THROTTLE_MAX_RATE,
        key = "troupe.throttle.max-rate",
        type = UsizeValue,
        default = 2000,
        validate = |value| *value > 0,
        doc = "Outbound messages per window at which the throttle delays every send by a full window.",
        version = "0.1"
    }

    troupe_config! {
        THROTTLE_WINDOW,
        key = "troupe.throttle.window",
        type = DurationValue,
        default = Duration::from_secs(1),
        validate = |value| *value > Duration::ZERO,
        doc = "The sliding window over which outbound messages are counted.",
        version = "0.1"
    }

    troupe_config! {
        THROTTLE_THRESHOLD,
        key = "troupe.throttle.threshold",
        type = RealValue,
        default = 0.7,
        validate = |value| 0.0 < *value && *value <= 1.0,
        doc = "The fraction of the maximum rate below which sends are not delayed.",
        version = "0.1"
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ConfigSource {
    File(PathBuf),
    Str(String),
}

/// Every tunable of a system, read from its HOCON config
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuntimeSettings {
    pub(crate) label: String,
    pub(crate) version: String,
    pub(crate) address: String,
    pub(crate) capabilities: Capabilities,
    pub(crate) tick: Duration,
    pub(crate) max_drain_period: Duration,
    pub(crate) max_creation_delay: Duration,
    pub(crate) dead_address_timeout: Duration,
    pub(crate) convention_addresses: Vec<String>,
    pub(crate) convention: ConventionSettings,
    pub(crate) hysteresis: HysteresisSettings,
    pub(crate) transmit: TransmitSettings,
    pub(crate) throttle_max_rate: usize,
    pub(crate) throttle_window: Duration,
    pub(crate) throttle_threshold: f64,
}

impl RuntimeSettings {
    pub(crate) fn from_hocon(conf: &Hocon) -> Result<Self, ConfigError> {
        Ok(RuntimeSettings {
            label: keys::LABEL.read_or_default(conf)?,
            version: keys::VERSION.read_or_default(conf)?,
            address: keys::ADDRESS.read_or_default(conf)?,
            capabilities: keys::CAPABILITIES.read_or_default(conf)?,
            tick: keys::TICK.read_or_default(conf)?,
            max_drain_period: keys::MAX_DRAIN_PERIOD.read_or_default(conf)?,
            max_creation_delay: keys::MAX_CREATION_DELAY.read_or_default(conf)?,
            dead_address_timeout: keys::DEAD_ADDRESS_TIMEOUT.read_or_default(conf)?,
            convention_addresses: keys::CONVENTION_ADDRESSES.read_or_default(conf)?,
            convention: ConventionSettings {
                reregistration_period: keys::REREGISTRATION_PERIOD.read_or_default(conf)?,
                missed_checkins: keys::MISSED_CHECKINS.read_or_default(conf)?,
                ping_factor: keys::PING_FACTOR.read_or_default(conf)?,
            },
            hysteresis: HysteresisSettings {
                min_delay: keys::HYSTERESIS_MIN_DELAY.read_or_default(conf)?,
                max_delay: keys::HYSTERESIS_MAX_DELAY.read_or_default(conf)?,
                rate: keys::HYSTERESIS_RATE.read_or_default(conf)?,
            },
            transmit: TransmitSettings {
                max_retries: keys::MAX_RETRIES.read_or_default(conf)?,
                timeout: keys::TRANSMIT_TIMEOUT.read_or_default(conf)?,
                ack_timeout: keys::ACK_TIMEOUT.read_or_default(conf)?,
                backoff_min: keys::BACKOFF_MIN.read_or_default(conf)?,
                backoff_factor: keys::BACKOFF_FACTOR.read_or_default(conf)?,
                backoff_max: keys::BACKOFF_MAX.read_or_default(conf)?,
            },
            throttle_max_rate: keys::THROTTLE_MAX_RATE.read_or_default(conf)?,
            throttle_window: keys::THROTTLE_WINDOW.read_or_default(conf)?,
            throttle_threshold: keys::THROTTLE_THRESHOLD.read_or_default(conf)?,
        })
    }
}

/// A configuration builder for troupe systems
///
/// # Example
///
/// ```
/// use troupe::prelude::*;
///
/// let mut conf = SystemConfig::default();
/// conf.load_config_str("troupe.system.capabilities { GPU: true }")
///     .set_config_value(&troupe::config_keys::LABEL, "gpu-host".to_string());
/// let system = conf.build().expect("system");
/// assert_eq!("gpu-host", system.label());
/// ```
#[derive(Default)]
pub struct SystemConfig {
    pub(crate) config_sources: Vec<ConfigSource>,
    pub(crate) root_logger: Option<TroupeLogger>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) classes: ClassRegistry,
    pub(crate) module_provider: Option<Arc<dyn ModuleProvider>>,
    pub(crate) source_authority: Option<Box<dyn SourceAuthority>>,
}

impl fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SystemConfig{{
            config_sources={:?},
            root_logger={:?},
            clock={:?},
            transport={},
            classes={},
            module_provider={},
            source_authority={}
        }}",
            self.config_sources,
            self.root_logger,
            self.clock,
            if self.transport.is_some() { "<transport>" } else { "<default>" },
            self.classes.len(),
            if self.module_provider.is_some() { "<provider>" } else { "<none>" },
            if self.source_authority.is_some() { "<authority>" } else { "<none>" },
        )
    }
}

impl SystemConfig {
    /// Load a HOCON config from a file at `path`
    ///
    /// This method can be called multiple times, and the resulting configurations will be merged.
    /// Sources are merged in the order they were added.
    pub fn load_config_file<P>(&mut self, path: P) -> &mut Self
    where
        P: Into<PathBuf>,
    {
        self.config_sources.push(ConfigSource::File(path.into()));
        self
    }

    /// Load a HOCON config from a string
    ///
    /// This method can be called multiple times, and the resulting configurations will be merged.
    pub fn load_config_str<S>(&mut self, config: S) -> &mut Self
    where
        S: Into<String>,
    {
        self.config_sources.push(ConfigSource::Str(config.into()));
        self
    }

    /// Override a single value in the HOCON config
    pub fn set_config_value<T>(
        &mut self,
        config: &ConfigEntry<T>,
        value: <T as ConfigValueType>::Value,
    ) -> &mut Self
    where
        T: ConfigValueType,
    {
        let value_string = <T as ConfigValueType>::config_string(value);
        self.config_sources.push(ConfigSource::Str(format!(
            "{} = {}",
            config.key, value_string
        )));
        self
    }

    /// Use `logger` as the root of the system's logger
    pub fn logger(&mut self, logger: TroupeLogger) -> &mut Self {
        self.root_logger = Some(logger);
        self
    }

    /// Use `clock` instead of the wall clock
    pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = Some(clock);
        self
    }

    /// Exchange frames with other systems over `transport`
    ///
    /// Without a transport the system attaches to a private channel network,
    /// under the address configured as [ADDRESS](keys::ADDRESS).
    pub fn transport(&mut self, transport: Box<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    /// Make `class` available for creation by name
    pub fn register_class(&mut self, class: Arc<dyn ActorClass>) -> &mut Self {
        self.classes.register(class);
        self
    }

    /// Produce classes from loaded sources with `provider`
    pub fn module_provider(&mut self, provider: Arc<dyn ModuleProvider>) -> &mut Self {
        self.module_provider = Some(provider);
        self
    }

    /// Validate loaded sources with `authority`
    ///
    /// Without an authority, loads are ignored until an actor registers as one.
    pub fn source_authority(&mut self, authority: Box<dyn SourceAuthority>) -> &mut Self {
        self.source_authority = Some(authority);
        self
    }

    /// Finalise the config and use it to create an [ActorSystem](ActorSystem)
    ///
    /// Fails if the config cannot be loaded or holds illegal values.
    pub fn build(self) -> Result<ActorSystem, SystemError> {
        ActorSystem::try_new(self)
    }

    pub(crate) fn load_hocon(&self) -> Result<Hocon, SystemError> {
        let config = self
            .config_sources
            .iter()
            .try_fold(HoconLoader::new(), |loader, source| match source {
                ConfigSource::File(path) => loader.load_file(path),
                ConfigSource::Str(s) => loader.load_str(s),
            })?
            .hocon()?;
        Ok(config)
    }
}
