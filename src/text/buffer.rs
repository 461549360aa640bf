//! Wrapper module for [`Buffer`]
//!
//! The buffer itself is mostly orchestration: it owns the chunk arena, node sequence, marks,
//! channel registry and listeners, and every edit walks through the same steps with each of them.
//! The navigation, metadata and paragraph methods are defined alongside the pieces they operate on,
//! in the `iter`, `data` and `paragraph` modules.

use super::chunk::ChunkArena;
use super::data::{DataSet, Registry};
use super::event::{Event, Listeners};
use super::iter::Pos;
use super::mark::{Gravity, MarkId, MarkSet};
use super::node::{NodeKey, NodeSeq};
use super::paragraph::{self, is_break};
use super::{BufferId, Error, Iter};
use crate::config::{self, BufferConfig};
use std::fmt::{self, Debug, Formatter};


/// A mutable text buffer, addressable by [`Iter`]s
///
/// The text is stored as a sequence of *nodes*, each a run of text backed by a shared append-only
/// chunk and carrying the metadata for that run. Nodes are split wherever an edit or a metadata
/// range needs a boundary, and merged back together whenever their text is adjacent and their
/// metadata identical.
///
/// All operations are synchronous. Listeners connected with [`connect`] are called once an edit
/// has completed, before the editing method returns.
///
/// [`connect`]: Self::connect
pub struct Buffer {
    pub(super) id: BufferId,
    // Incremented on every change to the nodes, invalidating all existing iterators
    pub(super) stamp: u64,
    pub(super) config: BufferConfig,
    pub(super) chunks: ChunkArena,
    pub(super) nodes: NodeSeq,
    pub(super) marks: MarkSet,
    pub(super) registry: Registry,
    pub(super) listeners: Listeners,
    pub(super) next_paragraph: u64,
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("len", &self.nodes.len())
            .field("nodes", &self.nodes.count())
            .field("chunks", &self.chunks.len())
            .field("marks", &self.marks.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

impl Buffer {
    /// Creates a new, empty buffer with the global configuration
    pub fn new() -> Self {
        Buffer::with_config(config::global())
    }

    /// Creates a new, empty buffer with the given configuration
    pub fn with_config(config: BufferConfig) -> Self {
        Buffer {
            id: BufferId::random(),
            stamp: 0,
            chunks: ChunkArena::new(config.chunk_soft_limit),
            config,
            nodes: NodeSeq::new(),
            marks: MarkSet::new(),
            registry: Registry::new(),
            listeners: Listeners::default(),
            next_paragraph: 0,
        }
    }

    /// Returns the configuration the buffer was created with
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// (*Internal*) Invalidates every outstanding iterator
    pub(super) fn bump_stamp(&mut self) {
        self.stamp += 1;
    }

    /// Returns the length of the text, in bytes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.first().is_none()
    }

    /// Returns the number of nodes the text is currently stored in
    ///
    /// This is mostly useful for observing fragmentation.
    pub fn node_count(&self) -> usize {
        self.nodes.count()
    }

    /// Returns the number of chunks currently backing the text
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the full text of the buffer
    pub fn text(&self) -> String {
        let mut s = String::with_capacity(self.len());
        for (_, node) in self.nodes.iter() {
            s.push_str(self.chunks.text(&node.slice));
        }
        s
    }

    /// Returns the text between the two iterators, which may be given in either order
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn text_range(&self, start: &Iter, end: &Iter) -> String {
        let (a, b) = self.ordered(start, end);
        let mut s = String::new();
        self.for_each_piece(a, b, |piece| s.push_str(piece));
        s
    }

    /// Returns the number of characters between the two iterators, which may be given in either
    /// order
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn char_count(&self, start: &Iter, end: &Iter) -> usize {
        let (a, b) = self.ordered(start, end);
        let mut count = 0;
        self.for_each_piece(a, b, |piece| count += piece.chars().count());
        count
    }

    /// Returns the number of bytes between the two iterators, which may be given in either order
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn byte_count(&self, start: &Iter, end: &Iter) -> usize {
        let (a, b) = self.ordered(start, end);
        let mut count = 0;
        self.for_each_piece(a, b, |piece| count += piece.len());
        count
    }

    /// (*Internal*) Calls `f` with the text of each node between the two ordered positions,
    /// trimmed to the range
    fn for_each_piece(&self, a: Pos, b: Pos, mut f: impl FnMut(&str)) {
        let mut cur = a;
        while let Some(key) = cur.node {
            let text = self.node_text(key);
            if Some(key) == b.node {
                f(&text[cur.offset..b.offset]);
                return;
            }

            f(&text[cur.offset..]);
            cur = self.canonical(key, text.len());
        }
    }

    /// (*Internal*) Ensures that a node starts at `pos`, returning it, or `None` if `pos` is the
    /// end of the buffer
    pub(super) fn split_at(&mut self, pos: Pos) -> Option<NodeKey> {
        let key = pos.node?;
        if pos.offset == 0 {
            return Some(key);
        }

        let right = self.nodes.split(key, pos.offset, &mut self.chunks);
        self.marks.relocate_split(key, pos.offset, right, &self.nodes);
        Some(right)
    }

    /// (*Internal*) Merges the node into its predecessor if possible, returning whether it was
    ///
    /// Nodes that no longer exist are ignored, so that candidates can be collected up front and
    /// merged afterwards.
    pub(super) fn try_merge(&mut self, key: NodeKey) -> bool {
        if !self.config.merge_nodes
            || !self.nodes.contains(key)
            || !self.nodes.mergeable_with_prev(key)
        {
            return false;
        }

        let pred = match self.nodes.prev(key) {
            Some(p) => p,
            None => return false,
        };

        let pred_len = self.nodes.get(pred).len();
        self.marks.relocate_merge(key, pred, pred_len, &self.nodes);
        self.nodes.merge_into_prev(key, &mut self.chunks);
        true
    }

    /// Inserts `text` at the iterator, returning iterators to the start and end of the inserted
    /// text
    ///
    /// The inserted text carries no metadata, apart from its paragraph. Marks at the insertion
    /// point end up before or after the text according to their [`Gravity`]. Listeners receive an
    /// [`Event::Inserted`] once the insertion is complete.
    ///
    /// Inserting an empty string does nothing, and returns the given iterator twice.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn insert(&mut self, at: &Iter, text: &str) -> (Iter, Iter) {
        let pos = self.check(at);
        if text.is_empty() {
            return (*at, *at);
        }

        log::trace!(
            "insert {} bytes at {}",
            text.len(),
            self.offset_of_pos(pos)
        );

        let before = self.split_at(pos);
        let at_pos = Pos {
            node: before,
            offset: 0,
        };

        let separators = self.config.paragraph_separators;
        let pieces = paragraph::segments(text, separators);
        let (ids, split_tail) = self.initial_paragraphs(before, &pieces);

        let mut new_nodes = Vec::with_capacity(pieces.len());
        for (piece, id) in pieces.into_iter().zip(ids) {
            let prev = match before {
                Some(b) => self.nodes.prev(b),
                None => self.nodes.last(),
            };

            let append_to = prev
                .map(|p| &self.nodes.get(p).slice)
                .filter(|s| self.chunks.can_append_after(s))
                .map(|s| s.chunk());

            let slice = match append_to {
                Some(chunk) => {
                    let start = self.chunks.append(chunk, piece);
                    self.chunks.slice(chunk, start..start + piece.len())
                }
                None => self.chunks.new_chunk(piece),
            };

            let key = self
                .nodes
                .insert_before(before, slice, DataSet::with_paragraph(id));
            new_nodes.push(key);
        }

        let first_new = new_nodes[0];
        self.marks.relocate_insert(at_pos, first_new, &self.nodes);

        let start_mark = self
            .marks
            .insert(Pos::start_of(first_new), Gravity::Left, &self.nodes);
        let end_mark = self.marks.insert(at_pos, Gravity::Right, &self.nodes);

        let mut merges = new_nodes.clone();
        if let (Some(b), Some((from, to))) = (before, split_tail) {
            self.retag_forward(b, from, to, &mut merges);
        }
        self.fix_boundary(first_new, &mut merges);
        if let Some(b) = before {
            self.fix_boundary(b, &mut merges);
            merges.push(b);
        }

        for key in merges {
            self.try_merge(key);
        }

        let start = self.take_temporary_mark(start_mark);
        let end = self.take_temporary_mark(end_mark);
        self.bump_stamp();

        let (start, end) = (self.make_iter(start), self.make_iter(end));
        self.emit(&Event::Inserted { start, end, text });
        (start, end)
    }

    /// (*Internal*) Picks the paragraph ids for the pieces of text about to be inserted before
    /// `before`
    ///
    /// The first piece continues the paragraph before it and the last piece continues the one
    /// after it, where there's no break in between. Everything else gets a fresh id.
    ///
    /// If the insertion point is inside a paragraph and the new text puts a break anywhere in it,
    /// the part of that paragraph from `before` onwards has to move to a fresh id. This is given
    /// as the second return value, `(old, new)`, for the caller to retag once the pieces are in
    /// place; the last piece already uses `new` if it continues into that part.
    fn initial_paragraphs(
        &mut self,
        before: Option<NodeKey>,
        pieces: &[&str],
    ) -> (Vec<u64>, Option<(u64, u64)>) {
        let separators = self.config.paragraph_separators;
        let prev = match before {
            Some(b) => self.nodes.prev(b),
            None => self.nodes.last(),
        };

        let left = prev.and_then(|p| {
            let lc = self.last_char(p)?;
            let fc = pieces.first()?.chars().next()?;
            if is_break(lc, fc, separators) {
                None
            } else {
                Some(self.nodes.get(p).data.paragraph())
            }
        });

        let mut right = before.and_then(|b| {
            let lc = pieces.last()?.chars().next_back()?;
            let rc = self.first_char(b)?;
            if is_break(lc, rc, separators) {
                None
            } else {
                Some(self.nodes.get(b).data.paragraph())
            }
        });

        let n = pieces.len();
        let shared = match (prev, before) {
            (Some(p), Some(b)) => {
                let id = self.nodes.get(p).data.paragraph();
                Some(id).filter(|&id| id == self.nodes.get(b).data.paragraph())
            }
            _ => None,
        };

        let mut split_tail = None;
        if let Some(old) = shared {
            if left.is_none() || right.is_none() || n > 1 {
                let new = self.fresh_paragraph();
                log::trace!("splitting paragraph {} into {}", old, new);
                split_tail = Some((old, new));
                right = right.map(|_| new);
            }
        }

        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let id = if i == 0 && left.is_some() {
                left
            } else if i == n - 1 {
                right
            } else {
                None
            };

            let id = match id {
                Some(id) => id,
                None => self.fresh_paragraph(),
            };
            ids.push(id);
        }

        (ids, split_tail)
    }

    /// Inserts the bytes at the iterator, after checking that they're valid UTF-8
    ///
    /// Otherwise identical to [`insert`].
    ///
    /// ## Errors
    ///
    /// Fails without changing anything if the bytes aren't valid UTF-8.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    ///
    /// [`insert`]: Self::insert
    pub fn insert_bytes(&mut self, at: &Iter, bytes: &[u8]) -> Result<(Iter, Iter), Error> {
        self.check(at);
        let text = std::str::from_utf8(bytes).map_err(|e| Error::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;

        Ok(self.insert(at, text))
    }

    /// Removes the text between the two iterators, which may be given in either order, returning
    /// an iterator at the point where the text was
    ///
    /// Marks within the removed range collapse onto that point, as do the values of any metadata
    /// stored on the removed text. Listeners receive an [`Event::Deleted`] once the removal is
    /// complete.
    ///
    /// If the two iterators are equal, nothing happens and the same iterator is returned.
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn delete(&mut self, start: &Iter, end: &Iter) -> Iter {
        let (a, b) = self.ordered(start, end);
        if a == b {
            return self.make_iter(a);
        }

        log::trace!(
            "delete {}..{}",
            self.offset_of_pos(a),
            self.offset_of_pos(b)
        );

        // Only the event needs the offsets
        let range = match self.listeners.is_empty() {
            true => None,
            false => Some(self.offset_of_pos(a)..self.offset_of_pos(b)),
        };

        // Split the later position first, so that splitting the earlier one can't move it
        let end_node = self.split_at(b);
        let start_node = match self.split_at(a) {
            Some(n) => n,
            None => unreachable!("non-empty range starting at the end of the buffer"),
        };

        let collapse = Pos {
            node: end_node,
            offset: 0,
        };
        self.marks.relocate_span(start_node, collapse, &self.nodes);

        let mut cur = Some(start_node);
        while let Some(key) = cur {
            if Some(key) == end_node {
                break;
            }

            cur = self.nodes.next(key);
            self.nodes.remove(key, &mut self.chunks);
        }

        let at_mark = self.marks.insert(collapse, Gravity::Left, &self.nodes);

        let mut merges = Vec::new();
        if let Some(e) = end_node {
            self.fix_boundary(e, &mut merges);
            merges.push(e);
        }

        for key in merges {
            self.try_merge(key);
        }

        let at = self.take_temporary_mark(at_mark);
        self.bump_stamp();

        let at = self.make_iter(at);
        if let Some(range) = range {
            self.emit(&Event::Deleted { range, at });
        }
        at
    }

    /// Replaces the entire text of the buffer
    ///
    /// This is a deletion of everything followed by an insertion, and listeners are notified of
    /// both. All marks end up at the start (or end, for right gravity) of the new text.
    pub fn set_text(&mut self, text: &str) {
        let (start, end) = self.bounds();
        let start = self.delete(&start, &end);
        self.insert(&start, text);
    }

    /// (*Internal*) Removes a mark used to track a position across merges, returning where it
    /// ended up
    fn take_temporary_mark(&mut self, id: MarkId) -> Pos {
        match self.marks.remove(id, &self.nodes) {
            Some(mark) => mark.pos,
            None => unreachable!("temporary mark removed during an edit"),
        }
    }

    /// Creates a mark at the iterator, with [`Gravity::Left`]
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn create_mark(&mut self, at: &Iter) -> MarkId {
        self.create_mark_with_gravity(at, Gravity::Left)
    }

    /// Creates a mark at the iterator
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn create_mark_with_gravity(&mut self, at: &Iter, gravity: Gravity) -> MarkId {
        let pos = self.check(at);
        self.marks.insert(pos, gravity, &self.nodes)
    }

    /// Moves the mark to the iterator
    ///
    /// Marks aren't part of the text, so this doesn't invalidate any iterators.
    ///
    /// ## Errors
    ///
    /// Fails if the mark doesn't exist.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn update_mark(&mut self, mark: MarkId, to: &Iter) -> Result<(), Error> {
        let pos = self.check(to);
        match self.marks.update(mark, pos, &self.nodes) {
            true => Ok(()),
            false => Err(Error::InvalidMark),
        }
    }

    /// Removes the mark
    ///
    /// ## Errors
    ///
    /// Fails if the mark doesn't exist.
    pub fn delete_mark(&mut self, mark: MarkId) -> Result<(), Error> {
        self.marks
            .remove(mark, &self.nodes)
            .map(|_| ())
            .ok_or(Error::InvalidMark)
    }

    /// Returns an iterator at the mark's current position, if the mark exists
    pub fn iter_at_mark(&self, mark: MarkId) -> Option<Iter> {
        self.marks.get(mark).map(|m| self.make_iter(m.pos))
    }

    /// Returns the gravity of the mark, if it exists
    pub fn mark_gravity(&self, mark: MarkId) -> Option<Gravity> {
        self.marks.get(mark).map(|m| m.gravity)
    }

    /// Returns the number of marks in the buffer
    pub fn mark_count(&self) -> usize {
        self.marks.len()
    }
}
