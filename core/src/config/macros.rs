/// Declare a [ConfigEntry](crate::config::ConfigEntry) constant
///
/// # Example
///
/// ```
/// use troupe::{config::*, troupe_config};
///
/// troupe_config! {
///     MY_KEY,
///     key = "my-app.worker.count",
///     type = UsizeValue,
///     default = 4,
///     validate = |value| *value > 0,
///     doc = "How many workers to run.",
///     version = "0.1"
/// }
///
/// assert_eq!("my-app.worker.count", MY_KEY.key);
/// ```
#[macro_export]
macro_rules! troupe_config {
    (
        $name:ident,
        key = $key:literal,
        type = $t:ty,
        default = $default:expr,
        validate = |$value:ident| $validate:expr,
        doc = $doc:literal,
        version = $version:literal
    ) => {
        #[doc = $doc]
        #[doc = "\n# Key\n`"]
        #[doc = $key]
        #[doc = "`"]
        pub const $name: $crate::config::ConfigEntry<$t> = $crate::config::ConfigEntry {
            key: $key,
            doc: $doc,
            version: $version,
            value_type: ::std::marker::PhantomData,
            default: Some({
                fn default() -> <$t as $crate::config::ConfigValueType>::Value {
                    $default
                }
                default as fn() -> <$t as $crate::config::ConfigValueType>::Value
            }),
            validate: Some({
                fn validate($value: &<$t as $crate::config::ConfigValueType>::Value) -> bool {
                    $validate
                }
                validate as fn(&<$t as $crate::config::ConfigValueType>::Value) -> bool
            }),
        };
    };
    (
        $name:ident,
        key = $key:literal,
        type = $t:ty,
        default = $default:expr,
        doc = $doc:literal,
        version = $version:literal
    ) => {
        #[doc = $doc]
        #[doc = "\n# Key\n`"]
        #[doc = $key]
        #[doc = "`"]
        pub const $name: $crate::config::ConfigEntry<$t> = $crate::config::ConfigEntry {
            key: $key,
            doc: $doc,
            version: $version,
            value_type: ::std::marker::PhantomData,
            default: Some({
                fn default() -> <$t as $crate::config::ConfigValueType>::Value {
                    $default
                }
                default as fn() -> <$t as $crate::config::ConfigValueType>::Value
            }),
            validate: None,
        };
    };
}
