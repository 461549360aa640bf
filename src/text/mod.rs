//! The text buffer engine
//!
//! This module exports a few key types. The central one is [`Buffer`], which owns all of the
//! text and everything attached to it; positions within it are given by [`Iter`]s, which are
//! plain values that must be re-derived after every edit. Positions that need to survive edits
//! are [marks](MarkId), and per-range values are attached through typed [`Channel`]s.
//!
//! Internally, the pieces stack up like so:
//!
//!  * `chunk` - append-only string storage, shared by reference counts
//!  * `node` - the ordered sequence of runs over chunks, each run carrying its metadata
//!  * `mark` - the sorted index of marks, and the relocation passes that keep them in place
//!  * `data` - the channel registry and the metadata stored on each run
//!  * `paragraph` - paragraph ids, kept up to date on every edit
//!  * `buffer` - the orchestration of all of the above

use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

mod buffer;
mod chunk;
mod data;
mod error;
mod event;
mod iter;
mod mark;
mod node;
mod paragraph;
mod utf8;

pub use buffer::Buffer;
pub use data::{Channel, ChannelId, DataValue};
pub use error::Error;
pub use event::{Event, ListenerId};
pub use iter::Iter;
pub use mark::{Gravity, MarkId};

/// A unique identifier for a single [`Buffer`]
///
/// Every [`Iter`] and [`Channel`] carries the id of the buffer it was created by, so that using
/// one with the wrong buffer can be caught.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferId(Uuid);

/// The identity of a consumer of metadata channels
///
/// Channels are registered on behalf of an owner, so that every channel belonging to it can be
/// dropped at once with [`Buffer::unregister_instance`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(Uuid);

impl BufferId {
    /// Creates a new, random `BufferId`
    fn random() -> Self {
        BufferId(Uuid::new_v4())
    }
}

impl OwnerId {
    /// Creates a new, random `OwnerId`
    pub fn random() -> Self {
        OwnerId(Uuid::new_v4())
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "owner {}", self.0)
    }
}
