use super::*;
use crate::messaging::{Capabilities, CapabilityValue};
use std::{convert::TryFrom, time::Duration};

/// Value converter for type `String`
pub struct StringValue;
impl ConfigValueType for StringValue {
    type Value = String;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_string()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!("{:?}", value)
    }
}

/// Value converter for type `i64`
pub struct IntegerValue;
impl ConfigValueType for IntegerValue {
    type Value = i64;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_i64()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!("{}", value)
    }
}

/// Value converter for type `usize`
pub struct UsizeValue;
impl ConfigValueType for UsizeValue {
    type Value = usize;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_i64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!("{}", value)
    }
}

/// Value converter for type `f64`
pub struct RealValue;
impl ConfigValueType for RealValue {
    type Value = f64;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_f64()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!("{:?}", value)
    }
}

/// Value converter for type `bool`
pub struct BooleanValue;
impl ConfigValueType for BooleanValue {
    type Value = bool;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_bool()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        format!("{}", value)
    }
}

/// Value converter for [Duration](std::time::Duration)
pub struct DurationValue;
impl ConfigValueType for DurationValue {
    type Value = Duration;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        conf.as_duration()
            .ok_or_else(|| ConfigError::expected::<Self::Value>(conf))
    }

    fn config_string(value: Self::Value) -> String {
        if value.subsec_nanos() % 1_000_000 == 0 {
            format!(r#""{}ms""#, value.as_millis())
        } else {
            format!(r#""{}ns""#, value.as_nanos())
        }
    }
}

/// Value converter for arrays of other config values
pub struct ArrayOfValues<T: ConfigValueType> {
    _marker: PhantomData<T>,
}
impl<T: ConfigValueType> ConfigValueType for ArrayOfValues<T> {
    type Value = Vec<T::Value>;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        if let Hocon::Array(values) = conf {
            values
                .iter()
                .try_fold(Vec::with_capacity(values.len()), |mut acc, c| {
                    T::from_conf(c).map(|v| {
                        acc.push(v);
                        acc
                    })
                })
        } else {
            Err(ConfigError::expected::<Self::Value>(conf))
        }
    }

    fn config_string(value: Self::Value) -> String {
        let formatted: Vec<String> = value.into_iter().map(T::config_string).collect();
        format!("[{}]", formatted.join(", "))
    }
}

/// Value converter for a flat object of system capabilities
///
/// Keys map to booleans, integers, reals or strings. Nested objects and arrays are rejected.
pub struct CapabilitiesValue;
impl ConfigValueType for CapabilitiesValue {
    type Value = Capabilities;

    fn from_conf(conf: &Hocon) -> Result<Self::Value, ConfigError> {
        if let Hocon::Hash(entries) = conf {
            entries
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        Hocon::Boolean(b) => CapabilityValue::Bool(*b),
                        Hocon::Integer(i) => CapabilityValue::Int(*i),
                        Hocon::Real(r) => CapabilityValue::Float(*r),
                        Hocon::String(s) => CapabilityValue::Str(s.clone()),
                        other => return Err(ConfigError::expected::<CapabilityValue>(other)),
                    };
                    Ok((name.clone(), value))
                })
                .collect()
        } else {
            Err(ConfigError::expected::<Self::Value>(conf))
        }
    }

    fn config_string(value: Self::Value) -> String {
        let formatted: Vec<String> = value
            .into_iter()
            .map(|(name, value)| {
                let v = match value {
                    CapabilityValue::Bool(b) => format!("{}", b),
                    CapabilityValue::Int(i) => format!("{}", i),
                    CapabilityValue::Float(f) => format!("{:?}", f),
                    CapabilityValue::Str(s) => format!("{:?}", s),
                };
                format!("{:?}: {}", name, v)
            })
            .collect();
        format!("{{{}}}", formatted.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::str_conf;

    #[test]
    fn test_duration() {
        let conf = str_conf("time = 7.3s");
        let res = DurationValue::from_conf(&conf["time"]);
        assert_eq!(Ok(Duration::from_millis(7300)), res);
    }

    #[test]
    fn test_string_array() {
        let conf = str_conf(r#"values = ["tcp://10.0.0.1:1900", "tcp://10.0.0.2:1900"]"#);
        let res = ArrayOfValues::<StringValue>::from_conf(&conf["values"]);
        assert_eq!(
            Ok(vec![
                "tcp://10.0.0.1:1900".to_string(),
                "tcp://10.0.0.2:1900".to_string()
            ]),
            res
        );
    }

    #[test]
    fn test_capabilities() {
        let conf = str_conf(
            r#"caps {
                GPU: true
                "Admin Port": 1900
                "apple pie": "hot"
            }"#,
        );
        let caps = CapabilitiesValue::from_conf(&conf["caps"]).expect("capabilities");
        assert_eq!(Some(&CapabilityValue::Bool(true)), caps.get("GPU"));
        assert_eq!(Some(&CapabilityValue::Int(1900)), caps.get("Admin Port"));
        assert_eq!(
            Some(&CapabilityValue::Str("hot".to_string())),
            caps.get("apple pie")
        );
    }

    #[test]
    fn test_capabilities_rendering_is_loadable() {
        let mut caps = Capabilities::new();
        caps.insert("GPU".to_string(), CapabilityValue::Bool(true));
        caps.insert("weight".to_string(), CapabilityValue::Float(0.5));
        let rendered = CapabilitiesValue::config_string(caps.clone());
        let conf = str_conf(&format!("caps = {}", rendered));
        assert_eq!(Ok(caps), CapabilitiesValue::from_conf(&conf["caps"]));
    }

    #[test]
    fn test_nested_capabilities_are_rejected() {
        let conf = str_conf("caps { inner { a = 1 } }");
        assert!(CapabilitiesValue::from_conf(&conf["caps"]).is_err());
    }
}
