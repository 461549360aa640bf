//! Configuration for [`Buffer`]s
//!
//! There's a single configuration struct here, [`BufferConfig`], which holds the handful of
//! tunables a buffer has. It can be built directly, deserialized from YAML through its builder, or
//! taken from the process-wide default that [`Buffer::new`] reads.
//!
//! [`Buffer`]: crate::text::Buffer
//! [`Buffer::new`]: crate::text::Buffer::new

use crate::XInto;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// A configuration struct with a builder and a global instance
///
/// Implementations are generated by the [`config`] macro.
pub trait ConfigPart: Default + Clone {
    /// The deserializable builder for the configuration
    type Builder: for<'a> Deserialize<'a> + Serialize + XInto<Self>;

    /// Returns a copy of the global configuration
    fn global() -> Self;

    /// Replaces the global configuration, returning the previous one
    fn set_global(new: Self) -> Self;

    /// Updates the local config with the fields set in the given builder
    fn update(&mut self, builder: Self::Builder);
}

/// The set of characters that end a paragraph
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParagraphSeparators {
    /// `'\n'`, `'\r'`, and U+2029 PARAGRAPH SEPARATOR
    All,
    /// Only `'\n'`
    NewlineOnly,
}

impl ParagraphSeparators {
    /// Returns whether the character terminates a line under this set
    pub fn is_terminator(self, c: char) -> bool {
        match self {
            ParagraphSeparators::All => matches!(c, '\n' | '\r' | '\u{2029}'),
            ParagraphSeparators::NewlineOnly => c == '\n',
        }
    }
}

config! {
    static GLOBAL_CONFIG;

    pub struct BufferConfig (BufferConfigBuilder) {
        /// The size, in bytes, past which a chunk is no longer extended in place
        ///
        /// Sequential typing appends to the chunk behind the previous node for as long as the
        /// chunk is below this size; afterwards a fresh chunk is started.
        pub chunk_soft_limit: usize = 64 * 1024,

        /// Whether adjacent nodes are merged when their contents and metadata allow it
        ///
        /// This is only worth turning off to inspect fragmentation.
        pub merge_nodes: bool = true,

        /// The characters that break paragraphs
        pub paragraph_separators: ParagraphSeparators = ParagraphSeparators::All,
    }
}

/// An error from reading a configuration
#[derive(Debug)]
pub enum Error {
    Yaml(serde_yaml::Error),
    /// A value was given that's outside of what the field allows
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Yaml(e) => write!(f, "malformed buffer config: {}", e),
            Error::Invalid { field, reason } => write!(f, "invalid `{}`: {}", field, reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Yaml(e) => Some(e),
            Error::Invalid { .. } => None,
        }
    }
}

impl BufferConfig {
    /// Parses a configuration from YAML, filling missing fields with their defaults
    ///
    /// ## Errors
    ///
    /// Returns an error if the YAML is malformed, has unknown fields, or sets a chunk limit of
    /// zero.
    pub fn from_yaml_str(s: &str) -> Result<Self, Error> {
        let builder: BufferConfigBuilder = serde_yaml::from_str(s).map_err(Error::Yaml)?;
        let config: BufferConfig = builder.xinto();
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values in the configuration are usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.chunk_soft_limit == 0 {
            return Err(Error::Invalid {
                field: "chunk_soft_limit",
                reason: "must be greater than zero",
            });
        }

        Ok(())
    }
}

/// Returns a copy of the global [`BufferConfig`]
pub fn global() -> BufferConfig {
    <BufferConfig as ConfigPart>::global()
}

/// Replaces the global [`BufferConfig`], returning the previous one
pub fn set_global(config: BufferConfig) -> BufferConfig {
    log::debug!("replacing global buffer config: {:?}", config);
    <BufferConfig as ConfigPart>::set_global(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_is_default() {
        let config = BufferConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, BufferConfig::default());
        assert_eq!(config.chunk_soft_limit, 65536);
    }

    #[test]
    fn partial_yaml() {
        let config =
            BufferConfig::from_yaml_str("chunk_soft_limit: 16\nparagraph_separators: NewlineOnly")
                .unwrap();

        assert_eq!(config.chunk_soft_limit, 16);
        assert!(config.merge_nodes);
        assert_eq!(config.paragraph_separators, ParagraphSeparators::NewlineOnly);
    }

    #[test]
    fn unknown_field_rejected() {
        let res = BufferConfig::from_yaml_str("chunk_size: 16");
        assert!(matches!(res, Err(Error::Yaml(_))));
    }

    #[test]
    fn zero_limit_rejected() {
        let res = BufferConfig::from_yaml_str("chunk_soft_limit: 0");
        assert!(matches!(
            res,
            Err(Error::Invalid {
                field: "chunk_soft_limit",
                ..
            })
        ));
    }

    #[test]
    fn builder_update() {
        let mut config = BufferConfig::default();
        let builder = BufferConfigBuilder {
            merge_nodes: Some(false),
            ..Default::default()
        };
        config.update(builder);

        assert!(!config.merge_nodes);
        assert_eq!(config.chunk_soft_limit, 65536);
    }

    #[test]
    fn separators() {
        assert!(ParagraphSeparators::All.is_terminator('\u{2029}'));
        assert!(ParagraphSeparators::All.is_terminator('\r'));
        assert!(!ParagraphSeparators::NewlineOnly.is_terminator('\r'));
        assert!(ParagraphSeparators::NewlineOnly.is_terminator('\n'));
    }
}
