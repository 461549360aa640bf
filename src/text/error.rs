//! Wrapper module for the [`Error`] type

use super::ChannelId;
use std::fmt::{self, Display, Formatter};

/// An enumerated error type for the recoverable failures of [`Buffer`] operations
///
/// Misuse of [`Iter`]s is not represented here; that's a broken contract with the caller, and
/// panics instead. Refer to the `## Panics` sections of the individual methods.
///
/// [`Buffer`]: super::Buffer
/// [`Iter`]: super::Iter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The channel was never registered with this buffer, or has since been unregistered
    InvalidChannel { id: ChannelId },
    /// The channel exists, but belongs to a different owner
    ChannelOwnerMismatch { id: ChannelId },
    /// The channel was registered with a different value type
    TypeMismatch {
        id: ChannelId,
        expected: &'static str,
        found: &'static str,
    },
    /// The mark doesn't exist (anymore)
    InvalidMark,
    /// The bytes given for insertion aren't valid UTF-8
    InvalidUtf8 { valid_up_to: usize },
    /// A byte offset past the end of the buffer, or not on a character boundary
    InvalidOffset { offset: usize, len: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use Error::*;

        match self {
            InvalidChannel { id } => write!(f, "no such channel: {}", id),
            ChannelOwnerMismatch { id } => write!(f, "{} is owned by someone else", id),
            TypeMismatch {
                id,
                expected,
                found,
            } => write!(
                f,
                "{} holds values of type `{}`, not `{}`",
                id, expected, found
            ),
            InvalidMark => write!(f, "no such mark"),
            InvalidUtf8 { valid_up_to } => write!(
                f,
                "invalid UTF-8 after {} valid bytes",
                valid_up_to
            ),
            InvalidOffset { offset, len } => write!(
                f,
                "byte offset {} is not a character boundary within length {}",
                offset, len
            ),
        }
    }
}

impl std::error::Error for Error {}
