//! Typed access to the HOCON configuration of a system.
//!
//! Every tunable of the runtime is described by a [ConfigEntry](ConfigEntry),
//! which knows its full HOCON path, how to convert the raw value,
//! what to fall back to when the key is absent, and which values are legal.
//! Entries are declared with the [troupe_config](crate::troupe_config) macro.

use hocon::Hocon;
use std::{error::Error, fmt, marker::PhantomData};

#[macro_use]
mod macros;
mod converters;

pub use converters::*;

/// Description of a configuration parameter that can be set via HOCON config.
pub struct ConfigEntry<T>
where
    T: ConfigValueType,
{
    /// The full path of this value in a HOCON config, e.g. `troupe.system.tick`.
    pub key: &'static str,
    /// Documentation for this config entry.
    pub doc: &'static str,
    /// The version in which the value was introduced.
    pub version: &'static str,
    /// Type information of this config value.
    pub value_type: PhantomData<T>,
    /// The default value for this config entry.
    ///
    /// Used if no value is specified in the HOCON config.
    pub default: Option<fn() -> T::Value>,
    /// An optional check that a configured value is legal.
    pub validate: Option<fn(&T::Value) -> bool>,
}

impl<T> ConfigEntry<T>
where
    T: ConfigValueType,
{
    /// Returns the path segments of this key, root first.
    pub fn path_segments(&self) -> impl Iterator<Item = &'static str> {
        self.key.split('.')
    }

    /// Select the entry corresponding to this key from the given config.
    pub fn select<'a>(&self, conf: &'a Hocon) -> &'a Hocon {
        self.path_segments()
            .fold(conf, |hocon, segment| &hocon[segment])
    }

    /// Read the value for this key from the given config.
    ///
    /// Fails if the key is absent, even if a default exists.
    pub fn read(&self, conf: &Hocon) -> Result<T::Value, ConfigError> {
        let hocon = self.select(conf);
        if let Hocon::BadValue(error) = hocon {
            Err(error.clone().into())
        } else {
            let value = T::from_conf(hocon)?;
            self.check(value)
        }
    }

    /// Read the value for this key, falling back to the default if it is absent.
    pub fn read_or_default(&self, conf: &Hocon) -> Result<T::Value, ConfigError> {
        match self.select(conf) {
            Hocon::BadValue(hocon::Error::MissingKey) => match self.default {
                Some(default) => Ok(default()),
                None => Err(ConfigError::Missing(self.key)),
            },
            Hocon::BadValue(error) => Err(error.clone().into()),
            hocon => {
                let value = T::from_conf(hocon)?;
                self.check(value)
            }
        }
    }

    fn check(&self, value: T::Value) -> Result<T::Value, ConfigError> {
        match self.validate {
            Some(is_legal) if !is_legal(&value) => Err(ConfigError::Invalid(self.key)),
            _ => Ok(value),
        }
    }
}

/// A value extractor for config values
pub trait ConfigValueType {
    /// The type of the value extracted by this type.
    type Value;

    /// Extract the value from a config instance.
    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError>;

    /// Render a value as HOCON, for use with
    /// [set_config_value](crate::prelude::SystemConfig::set_config_value).
    fn config_string(value: Self::Value) -> String;
}

/// Errors that occur during config lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Type conversion failed.
    ConversionError(String),
    /// Path traversal failed.
    PathError(hocon::Error),
    /// The key is absent and has no default.
    Missing(&'static str),
    /// The value at the key failed validation.
    Invalid(&'static str),
}

impl ConfigError {
    pub(crate) fn expected<T>(conf: &Hocon) -> Self {
        let descr = format!(
            "Expected {} config value, but got {:?}",
            std::any::type_name::<T>(),
            conf
        );
        ConfigError::ConversionError(descr)
    }
}

impl From<hocon::Error> for ConfigError {
    fn from(error: hocon::Error) -> Self {
        ConfigError::PathError(error)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ConversionError(description) => {
                write!(f, "Error during type conversion: {}", description)
            }
            ConfigError::PathError(error) => write!(f, "Error during path traversal: {}", error),
            ConfigError::Missing(key) => write!(f, "No value or default for config key {}", key),
            ConfigError::Invalid(key) => write!(f, "Illegal value for config key {}", key),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::PathError(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hocon::HoconLoader;
    use std::time::Duration;

    pub(crate) fn str_conf(s: &str) -> Hocon {
        HoconLoader::new()
            .load_str(s)
            .expect("config")
            .hocon()
            .expect("config")
    }

    troupe_config! {
        TEST_KEY,
        key = "troupe.test.my-key",
        type = StringValue,
        default = "fallback".to_string(),
        doc = "A key for testing.",
        version = "0.1"
    }

    troupe_config! {
        TEST_RETRIES,
        key = "troupe.test.retries",
        type = UsizeValue,
        default = 3,
        validate = |value| *value > 0,
        doc = "A validated key for testing.",
        version = "0.1"
    }

    troupe_config! {
        TEST_PERIOD,
        key = "troupe.test.period",
        type = DurationValue,
        default = Duration::from_secs(1),
        doc = "A duration key for testing.",
        version = "0.1"
    }

    #[test]
    fn nested_key_is_read() {
        let conf = str_conf(
            r#"
            troupe {
                test {
                    my-key: "testme"
                    period: 250ms
                }
            }
            "#,
        );
        assert_eq!(Ok("testme".to_string()), TEST_KEY.read(&conf));
        assert_eq!(Ok(Duration::from_millis(250)), TEST_PERIOD.read_or_default(&conf));
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        let conf = str_conf("troupe.other = 1");
        assert_eq!(Ok("fallback".to_string()), TEST_KEY.read_or_default(&conf));
        assert_eq!(Ok(3), TEST_RETRIES.read_or_default(&conf));
        assert!(TEST_KEY.read(&conf).is_err());
    }

    #[test]
    fn validation_rejects_illegal_values() {
        let conf = str_conf("troupe.test.retries = 0");
        assert_eq!(
            Err(ConfigError::Invalid("troupe.test.retries")),
            TEST_RETRIES.read_or_default(&conf)
        );
    }

    #[test]
    fn wrong_type_is_a_conversion_error() {
        let conf = str_conf("troupe.test.retries = \"lots\"");
        match TEST_RETRIES.read_or_default(&conf) {
            Err(ConfigError::ConversionError(_)) => (),
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
