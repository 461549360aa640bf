//! Wrapper module for [`Iter`], alongside the navigation methods on [`Buffer`]
//!
//! An `Iter` is nothing more than a snapshot of a position. It's `Copy`, holds no borrow on the
//! buffer, and records the buffer's modification stamp at the time it was made; any later change
//! to the buffer makes it unusable. Positions that must survive edits should be kept as marks
//! instead.
//!
//! Internally, positions are *canonical*: an iterator always refers to the character it precedes,
//! so its offset is strictly less than the length of its node. The position after the last
//! character is represented by the end sentinel, with no node at all. This gives every logical
//! position exactly one representation, which keeps comparison and mark relocation simple.

use super::buffer::Buffer;
use super::node::{NodeKey, NodeSeq};
use super::{utf8, BufferId, Error};
use std::cmp::Ordering;

/// (*Internal*) A canonical position within the node sequence
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) struct Pos {
    /// The node containing the character at this position, or `None` for the end of the buffer
    pub node: Option<NodeKey>,
    pub offset: usize,
}

impl Pos {
    /// The end of the buffer
    pub const END: Pos = Pos {
        node: None,
        offset: 0,
    };

    pub fn start_of(node: NodeKey) -> Pos {
        Pos {
            node: Some(node),
            offset: 0,
        }
    }

    /// Returns the key by which positions are totally ordered
    pub fn key(self, nodes: &NodeSeq) -> (u64, usize) {
        (nodes.order(self.node), self.offset)
    }
}

/// A position within a [`Buffer`]
///
/// Iterators are produced by the buffer - from [`bounds`], [`iter_at_offset`], marks, or as the
/// result of an edit - and are only valid until the buffer is next modified. Using an iterator
/// after that point (or with a different buffer) is a programming error, and will panic.
///
/// [`bounds`]: Buffer::bounds
/// [`iter_at_offset`]: Buffer::iter_at_offset
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Iter {
    pub(super) buffer: BufferId,
    pub(super) stamp: u64,
    pub(super) pos: Pos,
}

impl Buffer {
    /// (*Internal*) Validates the iterator, returning the position it refers to
    ///
    /// ## Panics
    ///
    /// Panics if the iterator was made by a different buffer, or before the most recent change to
    /// this one.
    pub(super) fn check(&self, iter: &Iter) -> Pos {
        assert!(
            iter.buffer == self.id,
            "iterator belongs to a different buffer"
        );
        assert!(
            iter.stamp == self.stamp,
            "iterator used after the buffer was modified (made at stamp {}, buffer is at {})",
            iter.stamp,
            self.stamp
        );

        iter.pos
    }

    pub(super) fn make_iter(&self, pos: Pos) -> Iter {
        Iter {
            buffer: self.id,
            stamp: self.stamp,
            pos,
        }
    }

    pub(super) fn pos_key(&self, pos: Pos) -> (u64, usize) {
        pos.key(&self.nodes)
    }

    /// (*Internal*) Validates both iterators, returning their positions in document order
    pub(super) fn ordered(&self, a: &Iter, b: &Iter) -> (Pos, Pos) {
        let (a, b) = (self.check(a), self.check(b));
        match self.pos_key(a) <= self.pos_key(b) {
            true => (a, b),
            false => (b, a),
        }
    }

    /// (*Internal*) Returns the text of the node
    pub(super) fn node_text(&self, key: NodeKey) -> &str {
        self.chunks.text(&self.nodes.get(key).slice)
    }

    /// (*Internal*) Produces the canonical position for `offset` within `key`, where `offset` may
    /// be equal to the node's length
    pub(super) fn canonical(&self, key: NodeKey, offset: usize) -> Pos {
        if offset < self.nodes.get(key).len() {
            Pos {
                node: Some(key),
                offset,
            }
        } else {
            match self.nodes.next(key) {
                Some(next) => Pos::start_of(next),
                None => Pos::END,
            }
        }
    }

    /// (*Internal*) Returns the node containing the character at `pos`, or the last node if `pos`
    /// is the end
    pub(super) fn node_at_or_before(&self, pos: Pos) -> Option<NodeKey> {
        pos.node.or_else(|| self.nodes.last())
    }

    /// (*Internal*) Returns the node containing the character before `pos`
    pub(super) fn node_before(&self, pos: Pos) -> Option<NodeKey> {
        match pos.node {
            Some(k) if pos.offset > 0 => Some(k),
            Some(k) => self.nodes.prev(k),
            None => self.nodes.last(),
        }
    }

    /// (*Internal*) Returns the byte offset of the position from the start of the buffer
    //
    // TODO-ALG: This walks every node before the position. Caching subtree lengths in an indexed
    // tree over the nodes would make this logarithmic.
    pub(super) fn offset_of_pos(&self, pos: Pos) -> usize {
        let node = match pos.node {
            Some(n) => n,
            None => return self.nodes.len(),
        };

        let before: usize = self
            .nodes
            .iter()
            .take_while(|(k, _)| *k != node)
            .map(|(_, n)| n.len())
            .sum();
        before + pos.offset
    }

    /// (*Internal*) Returns the position one character after `pos`, or `None` at the end
    fn step_forward(&self, pos: Pos) -> Option<Pos> {
        let key = pos.node?;
        let first = self.node_text(key).as_bytes()[pos.offset];
        let width = utf8::char_width(first).unwrap_or(1);
        Some(self.canonical(key, pos.offset + width))
    }

    /// (*Internal*) Returns the position one character before `pos`, or `None` at the start
    fn step_backward(&self, pos: Pos) -> Option<Pos> {
        let key = self.node_before(pos)?;
        let text = self.node_text(key);
        let end = match pos.node {
            Some(k) if k == key => pos.offset,
            _ => text.len(),
        };

        Some(Pos {
            node: Some(key),
            offset: end - utf8::width_before(text, end),
        })
    }

    /// Returns iterators at the start and end of the buffer
    pub fn bounds(&self) -> (Iter, Iter) {
        let start = match self.nodes.first() {
            Some(k) => Pos::start_of(k),
            None => Pos::END,
        };

        (self.make_iter(start), self.make_iter(Pos::END))
    }

    /// Returns an iterator at the given byte offset
    ///
    /// ## Errors
    ///
    /// Fails if the offset is past the end of the buffer, or doesn't fall on a character boundary.
    pub fn iter_at_offset(&self, offset: usize) -> Result<Iter, Error> {
        let invalid = Error::InvalidOffset {
            offset,
            len: self.len(),
        };

        let mut start = 0;
        for (key, node) in self.nodes.iter() {
            if offset < start + node.len() {
                let local = offset - start;
                if !self.node_text(key).is_char_boundary(local) {
                    return Err(invalid);
                }

                return Ok(self.make_iter(Pos {
                    node: Some(key),
                    offset: local,
                }));
            }

            start += node.len();
        }

        match offset == start {
            true => Ok(self.make_iter(Pos::END)),
            false => Err(invalid),
        }
    }

    /// Returns the byte offset of the iterator from the start of the buffer
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn offset_of(&self, iter: &Iter) -> usize {
        let pos = self.check(iter);
        self.offset_of_pos(pos)
    }

    /// Compares the positions of the two iterators
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn compare(&self, a: &Iter, b: &Iter) -> Ordering {
        let (a, b) = (self.check(a), self.check(b));
        self.pos_key(a).cmp(&self.pos_key(b))
    }

    /// Returns whether the iterator is at the start of the buffer
    ///
    /// In an empty buffer, the start is also the end.
    pub fn iter_is_start(&self, iter: &Iter) -> bool {
        let pos = self.check(iter);
        pos.offset == 0 && pos.node == self.nodes.first()
    }

    /// Returns whether the iterator is at the end of the buffer
    pub fn iter_is_end(&self, iter: &Iter) -> bool {
        self.check(iter).node.is_none()
    }

    /// Returns the character at the iterator, or `None` at the end of the buffer
    pub fn iter_char(&self, iter: &Iter) -> Option<char> {
        let pos = self.check(iter);
        let key = pos.node?;
        self.node_text(key)[pos.offset..].chars().next()
    }

    /// Moves the iterator forward by `count` characters
    ///
    /// Returns whether the full distance could be moved. If not, the iterator is left at the end
    /// of the buffer.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn iter_next(&self, iter: &mut Iter, count: usize) -> bool {
        let mut pos = self.check(iter);
        for _ in 0..count {
            match self.step_forward(pos) {
                Some(p) => pos = p,
                None => {
                    iter.pos = pos;
                    return false;
                }
            }
        }

        iter.pos = pos;
        true
    }

    /// Moves the iterator backward by `count` characters
    ///
    /// Returns whether the full distance could be moved. If not, the iterator is left at the
    /// start of the buffer.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn iter_previous(&self, iter: &mut Iter, count: usize) -> bool {
        let mut pos = self.check(iter);
        for _ in 0..count {
            match self.step_backward(pos) {
                Some(p) => pos = p,
                None => {
                    iter.pos = pos;
                    return false;
                }
            }
        }

        iter.pos = pos;
        true
    }

    /// Moves the iterator by `delta` bytes, forward if positive and backward if negative
    ///
    /// If the target falls inside a character, the iterator continues in the same direction to the
    /// next character boundary. Returns whether the full distance could be moved; if not, the
    /// iterator is left at the start or end of the buffer.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn iter_move_bytes(&self, iter: &mut Iter, delta: isize) -> bool {
        let pos = self.check(iter);
        let (pos, complete) = match delta.cmp(&0) {
            Ordering::Equal => (pos, true),
            Ordering::Greater => self.move_bytes_forward(pos, delta as usize),
            Ordering::Less => self.move_bytes_backward(pos, delta.unsigned_abs()),
        };

        iter.pos = pos;
        complete
    }

    fn move_bytes_forward(&self, mut pos: Pos, mut remaining: usize) -> (Pos, bool) {
        while remaining > 0 {
            let key = match pos.node {
                Some(k) => k,
                None => return (pos, false),
            };

            let available = self.nodes.get(key).len() - pos.offset;
            if remaining < available {
                let target = pos.offset + remaining;
                let offset = utf8::ceil_boundary(self.node_text(key), target);
                return (self.canonical(key, offset), true);
            }

            remaining -= available;
            pos = self.canonical(key, pos.offset + available);
        }

        (pos, true)
    }

    fn move_bytes_backward(&self, pos: Pos, mut remaining: usize) -> (Pos, bool) {
        let (mut key, mut offset) = match self.node_before(pos) {
            Some(k) if pos.node == Some(k) => (k, pos.offset),
            Some(k) => (k, self.nodes.get(k).len()),
            None => return (pos, false),
        };

        loop {
            if remaining <= offset {
                let target = offset - remaining;
                let offset = utf8::floor_boundary(self.node_text(key), target);
                return (self.canonical(key, offset), true);
            }

            remaining -= offset;
            match self.nodes.prev(key) {
                Some(prev) => {
                    key = prev;
                    offset = self.nodes.get(prev).len();
                }
                None => return (Pos::start_of(key), false),
            }
        }
    }

    /// Moves the iterator forward to the first character at or after it that satisfies `pred`
    ///
    /// Returns whether such a character was found. If not, the iterator is left at the end of the
    /// buffer.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn find_forward(&self, iter: &mut Iter, mut pred: impl FnMut(char) -> bool) -> bool {
        let mut pos = self.check(iter);
        while let Some(key) = pos.node {
            let text = &self.node_text(key)[pos.offset..];
            if let Some((idx, _)) = text.char_indices().find(|&(_, c)| pred(c)) {
                iter.pos = Pos {
                    node: Some(key),
                    offset: pos.offset + idx,
                };
                return true;
            }

            pos = self.canonical(key, self.nodes.get(key).len());
        }

        iter.pos = Pos::END;
        false
    }

    /// Moves the iterator backward to the nearest character before it that satisfies `pred`
    ///
    /// On success, the iterator is left pointing at that character. Otherwise, it's left at the
    /// start of the buffer and this returns `false`.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn find_backward(&self, iter: &mut Iter, mut pred: impl FnMut(char) -> bool) -> bool {
        let pos = self.check(iter);
        let mut cur = self.node_before(pos);
        let mut end = match pos.node {
            Some(k) if cur == Some(k) => pos.offset,
            _ => usize::MAX,
        };

        while let Some(key) = cur {
            let text = self.node_text(key);
            let text = &text[..end.min(text.len())];
            if let Some((idx, _)) = text.char_indices().rev().find(|&(_, c)| pred(c)) {
                iter.pos = Pos {
                    node: Some(key),
                    offset: idx,
                };
                return true;
            }

            cur = self.nodes.prev(key);
            end = usize::MAX;
        }

        let (start, _) = self.bounds();
        iter.pos = start.pos;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferConfig;

    fn buffer(text: &str) -> Buffer {
        let mut buf = Buffer::new();
        buf.set_text(text);
        buf
    }

    /// Builds a buffer whose text is spread over several nodes, one per piece
    fn fragmented(pieces: &[&str]) -> Buffer {
        let config = BufferConfig {
            merge_nodes: false,
            ..BufferConfig::default()
        };

        let mut buf = Buffer::with_config(config);
        for p in pieces {
            let (_, end) = buf.bounds();
            buf.insert(&end, p);
        }
        buf
    }

    #[test]
    fn offsets_round_trip() {
        let buf = fragmented(&["ab", "c€", "d"]);
        assert!(buf.node_count() >= 3);

        for &off in &[0, 1, 2, 3, 6, 7] {
            let iter = buf.iter_at_offset(off).unwrap();
            assert_eq!(buf.offset_of(&iter), off);
        }

        assert_eq!(
            buf.iter_at_offset(4),
            Err(Error::InvalidOffset { offset: 4, len: 7 })
        );
        assert!(buf.iter_at_offset(8).is_err());
    }

    #[test]
    fn char_steps_cross_nodes() {
        let buf = fragmented(&["a", "€", "b"]);
        let (mut iter, end) = buf.bounds();

        assert_eq!(buf.iter_char(&iter), Some('a'));
        assert!(buf.iter_next(&mut iter, 1));
        assert_eq!(buf.iter_char(&iter), Some('€'));
        assert!(buf.iter_next(&mut iter, 2));
        assert_eq!(iter, end);
        assert!(buf.iter_is_end(&iter));

        assert!(!buf.iter_next(&mut iter, 1));
        assert!(buf.iter_previous(&mut iter, 2));
        assert_eq!(buf.iter_char(&iter), Some('€'));
        assert!(!buf.iter_previous(&mut iter, 5));
        assert!(buf.iter_is_start(&iter));
    }

    #[test]
    fn byte_moves_snap_in_direction() {
        let buf = buffer("a€b");
        let (start, end) = buf.bounds();

        let mut iter = start;
        assert!(buf.iter_move_bytes(&mut iter, 2));
        assert_eq!(buf.offset_of(&iter), 4);

        assert!(buf.iter_move_bytes(&mut iter, -2));
        assert_eq!(buf.offset_of(&iter), 1);

        let mut iter = end;
        assert!(!buf.iter_move_bytes(&mut iter, -10));
        assert!(buf.iter_is_start(&iter));

        assert!(!buf.iter_move_bytes(&mut iter, 10));
        assert!(buf.iter_is_end(&iter));
    }

    #[test]
    fn byte_moves_across_nodes() {
        let buf = fragmented(&["ab", "cd", "ef"]);
        let (mut iter, _) = buf.bounds();

        assert!(buf.iter_move_bytes(&mut iter, 5));
        assert_eq!(buf.iter_char(&iter), Some('f'));
        assert!(buf.iter_move_bytes(&mut iter, -4));
        assert_eq!(buf.iter_char(&iter), Some('b'));
        assert!(buf.iter_move_bytes(&mut iter, 0));
        assert_eq!(buf.offset_of(&iter), 1);
    }

    #[test]
    fn find_in_both_directions() {
        let buf = fragmented(&["one ", "two ", "three"]);
        let (start, end) = buf.bounds();

        let mut iter = start;
        assert!(buf.find_forward(&mut iter, |c| c == 't'));
        assert_eq!(buf.offset_of(&iter), 4);
        // Inclusive of the current character
        assert!(buf.find_forward(&mut iter, |c| c == 't'));
        assert_eq!(buf.offset_of(&iter), 4);

        let mut iter = end;
        assert!(buf.find_backward(&mut iter, |c| c == ' '));
        assert_eq!(buf.offset_of(&iter), 7);
        // Exclusive of the current character
        assert!(buf.find_backward(&mut iter, |c| c == ' '));
        assert_eq!(buf.offset_of(&iter), 3);
        assert!(!buf.find_backward(&mut iter, |c| c == 'x'));
        assert!(buf.iter_is_start(&iter));

        let mut iter = start;
        assert!(!buf.find_forward(&mut iter, char::is_numeric));
        assert!(buf.iter_is_end(&iter));
    }

    #[test]
    fn compare_orders_positions() {
        let buf = fragmented(&["ab", "cd"]);
        let a = buf.iter_at_offset(1).unwrap();
        let b = buf.iter_at_offset(3).unwrap();
        let (_, end) = buf.bounds();

        assert_eq!(buf.compare(&a, &b), Ordering::Less);
        assert_eq!(buf.compare(&end, &b), Ordering::Greater);
        assert_eq!(buf.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn empty_buffer_bounds() {
        let buf = Buffer::new();
        let (start, end) = buf.bounds();

        assert_eq!(start, end);
        assert!(buf.iter_is_start(&start));
        assert!(buf.iter_is_end(&start));
        assert_eq!(buf.iter_char(&start), None);
    }

    #[test]
    #[should_panic(expected = "after the buffer was modified")]
    fn stale_iterator_panics() {
        let mut buf = buffer("abc");
        let (start, _) = buf.bounds();
        buf.insert(&start, "x");
        buf.iter_char(&start);
    }

    #[test]
    #[should_panic(expected = "different buffer")]
    fn foreign_iterator_panics() {
        let a = buffer("abc");
        let b = buffer("abc");
        let (start, _) = a.bounds();
        b.iter_char(&start);
    }
}
