//! Wrapper module for [`ChunkArena`] and [`ChunkSlice`]
//!
//! Text in a buffer is never stored directly in the nodes; each node refers to a range of a
//! *chunk*, which is an append-only string owned by the arena. Several nodes may point into the
//! same chunk, so chunks are reference-counted and freed once the last node pointing into them is
//! gone.

use slotmap::SlotMap;
use std::ops::Range;

slotmap::new_key_type! {
    /// (*Internal*) The key for a single chunk in a [`ChunkArena`]
    pub(super) struct ChunkKey;
}

/// (*Internal*) A single append-only string, with the number of slices referring to it
struct Chunk {
    text: String,
    refs: usize,
}

/// (*Internal*) The storage for all of the text in a buffer
///
/// The bytes handed out by the arena never move or change: appending only ever writes past the end
/// of a chunk, so any existing [`ChunkSlice`] stays valid while the chunk grows. The `String`
/// itself may reallocate, which is why slices store ranges instead of pointers.
pub(super) struct ChunkArena {
    chunks: SlotMap<ChunkKey, Chunk>,
    soft_limit: usize,
}

/// (*Internal*) A range of a single chunk
///
/// Each `ChunkSlice` corresponds to exactly one reference on its chunk. The type is intentionally
/// not `Clone`: new slices are only made through the arena, which keeps the count correct, and
/// slices are given back with [`ChunkArena::release`].
#[derive(Debug, PartialEq, Eq)]
pub(super) struct ChunkSlice {
    chunk: ChunkKey,
    range: Range<usize>,
}

impl ChunkSlice {
    /// Returns the length of the slice, in bytes
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn chunk(&self) -> ChunkKey {
        self.chunk
    }

    /// Returns whether `other` starts exactly where `self` ends, within the same chunk
    pub fn is_contiguous_with(&self, other: &ChunkSlice) -> bool {
        self.chunk == other.chunk && self.range.end == other.range.start
    }
}

impl ChunkArena {
    /// Creates a new, empty arena
    ///
    /// `soft_limit` gives the size past which a chunk will no longer be appended to.
    pub fn new(soft_limit: usize) -> Self {
        ChunkArena {
            chunks: SlotMap::with_key(),
            soft_limit,
        }
    }

    /// Returns the number of live chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Allocates a new chunk seeded with `text`, returning the slice covering all of it
    ///
    /// The new chunk has a reference count of one, held by the returned slice.
    pub fn new_chunk(&mut self, text: &str) -> ChunkSlice {
        let mut owned = String::with_capacity(text.len().max(64).min(self.soft_limit));
        owned.push_str(text);

        let chunk = self.chunks.insert(Chunk {
            text: owned,
            refs: 1,
        });

        log::debug!("new chunk {:?} with {} bytes", chunk, text.len());

        ChunkSlice {
            chunk,
            range: 0..text.len(),
        }
    }

    /// Returns whether `text` could be appended in place, directly after `slice`
    ///
    /// This is the case only when `slice` runs up to the current end of its chunk, and the chunk
    /// is still below the soft limit.
    pub fn can_append_after(&self, slice: &ChunkSlice) -> bool {
        let chunk = &self.chunks[slice.chunk];
        slice.range.end == chunk.text.len() && chunk.text.len() < self.soft_limit
    }

    /// Appends `text` to the chunk, returning the offset at which the new bytes start
    ///
    /// The reference count isn't changed; use [`slice`] to create a slice over the new bytes.
    ///
    /// ## Panics
    ///
    /// Panics if the chunk has already been freed.
    ///
    /// [`slice`]: Self::slice
    pub fn append(&mut self, chunk: ChunkKey, text: &str) -> usize {
        let chunk = &mut self.chunks[chunk];
        let start = chunk.text.len();
        chunk.text.push_str(text);
        start
    }

    /// Creates a new slice over the given range of the chunk, adding a reference to it
    pub fn slice(&mut self, chunk: ChunkKey, range: Range<usize>) -> ChunkSlice {
        debug_assert!(range.end <= self.chunks[chunk].text.len());

        self.retain(chunk);
        ChunkSlice { chunk, range }
    }

    /// Adds a reference to the chunk
    pub fn retain(&mut self, chunk: ChunkKey) {
        self.chunks[chunk].refs += 1;
    }

    /// Gives back the slice, freeing its chunk if it was the last reference to it
    pub fn release(&mut self, slice: ChunkSlice) {
        let chunk = &mut self.chunks[slice.chunk];
        chunk.refs -= 1;

        if chunk.refs == 0 {
            let freed = self.chunks.remove(slice.chunk);
            log::debug!(
                "freed chunk {:?} ({} bytes)",
                slice.chunk,
                freed.map(|c| c.text.len()).unwrap_or(0)
            );
        }
    }

    /// Returns the text of the slice
    pub fn text(&self, slice: &ChunkSlice) -> &str {
        &self.chunks[slice.chunk].text[slice.range.clone()]
    }

    /// Returns the number of slices referring to the chunk
    #[cfg(test)]
    pub fn refs(&self, chunk: ChunkKey) -> usize {
        self.chunks.get(chunk).map(|c| c.refs).unwrap_or(0)
    }

    /// Cuts the slice in two at the given index, returning the upper half
    ///
    /// This is analogous to [`slice::split_at`], but instead modifies the slice and returns only
    /// the second half of the tuple. Both halves refer to the same chunk, so its reference count
    /// goes up by one.
    pub fn split(&mut self, slice: &mut ChunkSlice, idx: usize) -> ChunkSlice {
        debug_assert!(idx > 0 && idx < slice.len());

        let new_range = slice.range.start + idx..slice.range.end;
        slice.range.end = slice.range.start + idx;

        self.retain(slice.chunk);
        ChunkSlice {
            chunk: slice.chunk,
            range: new_range,
        }
    }

    /// Attempts to extend `left` with `right`, giving `right` back if the two aren't adjacent in
    /// the same chunk
    ///
    /// On success, the reference held by `right` is released.
    pub fn try_join(&mut self, left: &mut ChunkSlice, right: ChunkSlice) -> Result<(), ChunkSlice> {
        if !left.is_contiguous_with(&right) {
            return Err(right);
        }

        left.range.end = right.range.end;
        // `right` can never be the last reference; `left` holds one too.
        self.chunks[right.chunk].refs -= 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chunk_has_one_ref() {
        let mut arena = ChunkArena::new(64);
        let slice = arena.new_chunk("hello");

        assert_eq!(arena.text(&slice), "hello");
        assert_eq!(arena.refs(slice.chunk()), 1);
        assert_eq!(arena.len(), 1);

        let key = slice.chunk();
        arena.release(slice);
        assert_eq!(arena.refs(key), 0);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn append_keeps_existing_slices() {
        let mut arena = ChunkArena::new(64);
        let first = arena.new_chunk("Hello");

        assert!(arena.can_append_after(&first));
        let start = arena.append(first.chunk(), " World");
        assert_eq!(start, 5);

        let second = arena.slice(first.chunk(), start..start + 6);
        assert_eq!(arena.text(&first), "Hello");
        assert_eq!(arena.text(&second), " World");
        assert_eq!(arena.refs(first.chunk()), 2);
        assert!(first.is_contiguous_with(&second));
    }

    #[test]
    fn append_only_at_chunk_end() {
        let mut arena = ChunkArena::new(64);
        let mut whole = arena.new_chunk("abcdef");
        let upper = arena.split(&mut whole, 3);

        // `whole` is now "abc", which doesn't reach the end of the chunk
        assert!(!arena.can_append_after(&whole));
        assert!(arena.can_append_after(&upper));
    }

    #[test]
    fn soft_limit_stops_appending() {
        let mut arena = ChunkArena::new(8);
        let slice = arena.new_chunk("12345678");
        assert!(!arena.can_append_after(&slice));

        let slice = arena.new_chunk("1234567");
        assert!(arena.can_append_after(&slice));
    }

    #[test]
    fn split_and_join() {
        let mut arena = ChunkArena::new(64);
        let mut left = arena.new_chunk("foobar");
        let key = left.chunk();

        let right = arena.split(&mut left, 3);
        assert_eq!(arena.text(&left), "foo");
        assert_eq!(arena.text(&right), "bar");
        assert_eq!(arena.refs(key), 2);

        assert!(arena.try_join(&mut left, right).is_ok());
        assert_eq!(arena.text(&left), "foobar");
        assert_eq!(arena.refs(key), 1);
    }

    #[test]
    fn join_rejects_gaps_and_foreign_chunks() {
        let mut arena = ChunkArena::new(64);
        let mut a = arena.new_chunk("abc");
        let b = arena.new_chunk("def");

        let b = arena.try_join(&mut a, b).unwrap_err();
        assert_eq!(arena.text(&b), "def");

        let mut whole = arena.new_chunk("0123456789");
        let mut mid = arena.split(&mut whole, 3);
        let tail = arena.split(&mut mid, 3);

        // "012" and "6789" aren't adjacent
        let tail = arena.try_join(&mut whole, tail).unwrap_err();
        assert_eq!(arena.text(&tail), "6789");
        assert_eq!(arena.len(), 3);
    }
}
