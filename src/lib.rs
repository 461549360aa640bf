//! A mutable, iterator-addressable text buffer
//!
//! The interesting part of this crate lives in the [`text`] module: a [`Buffer`] storing its
//! content as a sequence of runs over shared, append-only chunks, with per-range metadata, marks
//! that survive edits, and incrementally maintained paragraph boundaries. Layout, rendering and
//! everything else a text view needs are left to the consumer.
//!
//! The remaining modules are the ambient pieces: [`logger`] for routing the `log` output of the
//! crate somewhere useful, and [`config`] for the tunables of a buffer.
//!
//! [`Buffer`]: text::Buffer

// "todo" categories:
//  * TODO-ERROR: Places where error handling should be improved
//  * TODO-ALG: Places where algorithms could be improved for efficiency
//  * TODO-DOC: Places where documentation is desparately needed
//  * TODO-CORRECTNESS: Where the code might not be correct, but works for now
//  * TODO-FEATURE: Where a feature should be added

#![warn(clippy::style, clippy::perf)]
#![deny(
    clippy::perf,
    clippy::len_zero,
    clippy::redundant_closure,
    unused_must_use
)]

#[macro_use]
mod macros;

pub mod config;
pub mod logger;
pub mod text;
mod utils;

pub use config::BufferConfig;
pub use text::{Buffer, Channel, Error, Event, Gravity, Iter, MarkId, OwnerId};
pub use utils::{XFrom, XInto};
