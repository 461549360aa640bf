//! Macros used across the crate
//!
//! There's only one of these for now: [`config`], which produces a configuration struct along with
//! the builder used to deserialize it.

/// Produces a configuration struct with an associated implementation of [`ConfigPart`]
///
/// The macro takes the name of the static item storing the global value, the name of the
/// configuration struct (paired with the name of its builder), and the list of fields. Each field
/// is given the value it defaults to if not provided.
///
/// ## Example
///
/// ```ignore
/// config! {
///     // The static item that stores the global instance of the configuration
///     static GLOBAL_CONFIG;
///
///     // The main configuration name, paired with the name of the builder used to construct it
///     pub struct BufferConfig (BufferConfigBuilder) {
///         pub chunk_soft_limit: usize = 64 * 1024,
///     }
/// }
/// ```
///
/// The builder has the same fields, each wrapped in an `Option`, and implements `Deserialize`;
/// missing fields are filled in from the defaults when converting with [`XFrom`].
///
/// [`ConfigPart`]: crate::config::ConfigPart
/// [`XFrom`]: crate::XFrom
macro_rules! config {
    (
        static $global:ident;
        $config_vis:vis struct $config:ident ($builder:ident) {
            $(
                $(#[$field_attr:meta])*
                $field_vis:vis $field:ident: $field_ty:ty = $value:expr,
            )*
        }
    ) => {
        lazy_static::lazy_static! {
            static ref $global: std::sync::Mutex<$config> =
                std::sync::Mutex::new(Default::default());
        }

        #[derive(Debug, Clone, PartialEq)]
        $config_vis struct $config {
            $(
                $(#[$field_attr])*
                $field_vis $field: $field_ty,
            )*
        }

        /// The deserializable counterpart of the configuration, with every field optional
        #[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
        #[serde(deny_unknown_fields)]
        $config_vis struct $builder {
            $(
                #[serde(default)]
                pub $field: Option<$field_ty>,
            )*
        }

        impl $crate::XFrom<$builder> for $config {
            fn xfrom(builder: $builder) -> Self {
                Self {
                    $($field: builder.$field.unwrap_or_else(|| $value),)*
                }
            }
        }

        impl Default for $config {
            fn default() -> Self {
                Self {
                    $($field: $value,)*
                }
            }
        }

        impl $crate::config::ConfigPart for $config {
            type Builder = $builder;

            fn global() -> Self {
                // A poisoned lock only means that a writer panicked part-way through replacing
                // the value; the value itself is always whole.
                match $global.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                }
            }

            fn set_global(new: Self) -> Self {
                let mut guard = match $global.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                std::mem::replace(&mut *guard, new)
            }

            fn update(&mut self, builder: $builder) {
                $(if let Some(b) = builder.$field {
                    self.$field = b;
                })*
            }
        }
    };
}
