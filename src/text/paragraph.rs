//! Incremental maintenance of paragraph ids
//!
//! Every node carries the id of the paragraph it belongs to, in a reserved channel. Two adjacent
//! nodes share an id exactly when there's no paragraph break between them, where a break sits
//! between a terminator (`'\n'`, `'\r'` or U+2029, depending on the configuration) and a
//! following non-terminator. Runs of terminators - `"\r\n"`, or blank lines - stay at the end of
//! the paragraph they follow.
//!
//! Ids are allocated from a counter that only ever increases, so comparing two nodes' paragraphs
//! is a single integer comparison. Edits only ever need to re-examine the boundaries they touch:
//! [`fix_boundary`] is called at each one, and retags at most one paragraph. An insertion that
//! breaks up an existing paragraph moves its tail onto a fresh id before that.
//!
//! [`fix_boundary`]: Buffer::fix_boundary

use super::buffer::Buffer;
use super::iter::Pos;
use super::node::NodeKey;
use super::Iter;
use crate::config::ParagraphSeparators;

/// Splits `text` at every paragraph break within it
///
/// The pieces are never empty, and concatenate back to `text`. A break at the very start or end of
/// `text` can't be seen from here, and is left to the caller.
pub(super) fn segments(text: &str, separators: ParagraphSeparators) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev_term = false;

    for (idx, c) in text.char_indices() {
        let term = separators.is_terminator(c);
        if prev_term && !term {
            pieces.push(&text[start..idx]);
            start = idx;
        }
        prev_term = term;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Returns whether there's a paragraph break between the two characters
pub(super) fn is_break(before: char, after: char, separators: ParagraphSeparators) -> bool {
    separators.is_terminator(before) && !separators.is_terminator(after)
}

impl Buffer {
    /// (*Internal*) Allocates a new paragraph id
    pub(super) fn fresh_paragraph(&mut self) -> u64 {
        let id = self.next_paragraph;
        self.next_paragraph += 1;
        id
    }

    /// (*Internal*) Returns the last character of the node
    pub(super) fn last_char(&self, key: NodeKey) -> Option<char> {
        self.node_text(key).chars().next_back()
    }

    /// (*Internal*) Returns the first character of the node
    pub(super) fn first_char(&self, key: NodeKey) -> Option<char> {
        self.node_text(key).chars().next()
    }

    /// (*Internal*) Makes the paragraph ids on either side of the start of `right` agree with
    /// whether there's a break there
    ///
    /// Any node that's retagged - along with the node after the last of them - is added to
    /// `merges`, as a candidate for merging with its predecessor.
    pub(super) fn fix_boundary(&mut self, right: NodeKey, merges: &mut Vec<NodeKey>) {
        let left = match self.nodes.prev(right) {
            Some(l) => l,
            None => return,
        };

        let brk = match (self.last_char(left), self.first_char(right)) {
            (Some(lc), Some(rc)) => is_break(lc, rc, self.config.paragraph_separators),
            _ => unreachable!("empty node"),
        };

        let lid = self.nodes.get(left).data.paragraph();
        let rid = self.nodes.get(right).data.paragraph();

        if !brk && lid != rid {
            log::trace!("joining paragraph {} into {}", rid, lid);
            self.retag_forward(right, rid, lid, merges);
        } else if brk && lid == rid {
            let fresh = self.fresh_paragraph();
            log::trace!("splitting paragraph {} into {}", lid, fresh);
            self.retag_forward(right, rid, fresh, merges);
        }
    }

    /// (*Internal*) Sets the paragraph id of every node from `start` onwards that has id `from`,
    /// stopping at the first that doesn't
    ///
    /// Nodes are never merged here, only collected into `merges`.
    pub(super) fn retag_forward(
        &mut self,
        start: NodeKey,
        from: u64,
        to: u64,
        merges: &mut Vec<NodeKey>,
    ) {
        let mut cur = Some(start);
        while let Some(key) = cur {
            let data = &mut self.nodes.get_mut(key).data;
            if data.paragraph() != from {
                break;
            }

            data.set_paragraph(to);
            merges.push(key);
            cur = self.nodes.next(key);
        }

        merges.extend(cur);
    }

    /// Returns the start and end of the paragraph containing the iterator
    ///
    /// The paragraph includes its trailing terminators. At the end of the buffer, this gives the
    /// last paragraph. In an empty buffer, both iterators are at the (only) position.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn paragraph_extents(&self, iter: &Iter) -> (Iter, Iter) {
        let pos = self.check(iter);
        let node = match self.node_at_or_before(pos) {
            Some(n) => n,
            None => return (*iter, *iter),
        };

        let id = self.nodes.get(node).data.paragraph();
        let same = |k: &NodeKey| self.nodes.get(*k).data.paragraph() == id;

        let mut first = node;
        while let Some(prev) = self.nodes.prev(first).filter(same) {
            first = prev;
        }

        let mut last = node;
        while let Some(next) = self.nodes.next(last).filter(same) {
            last = next;
        }

        let end = self.canonical(last, self.nodes.get(last).len());
        (self.make_iter(Pos::start_of(first)), self.make_iter(end))
    }

    /// Returns the id of the paragraph containing the iterator, or `None` in an empty buffer
    ///
    /// Ids are only meaningful for comparison against each other, and only until the next edit.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn paragraph_id(&self, iter: &Iter) -> Option<u64> {
        let pos = self.check(iter);
        self.node_at_or_before(pos)
            .map(|n| self.nodes.get(n).data.paragraph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ParagraphSeparators::{All, NewlineOnly};

    #[test]
    fn segment_breaks() {
        assert_eq!(segments("line1\nline2", All), ["line1\n", "line2"]);
        assert_eq!(segments("a\r\nb", All), ["a\r\n", "b"]);
        assert_eq!(segments("a\n\n\nb\n", All), ["a\n\n\n", "b\n"]);
        assert_eq!(segments("\nx", All), ["\n", "x"]);
        assert_eq!(segments("one\u{2029}two", All), ["one\u{2029}", "two"]);
        assert_eq!(segments("no breaks", All), ["no breaks"]);
        assert!(segments("", All).is_empty());
    }

    #[test]
    fn segment_separator_sets() {
        assert_eq!(segments("a\rb\nc", All), ["a\r", "b\n", "c"]);
        assert_eq!(segments("a\rb\nc", NewlineOnly), ["a\rb\n", "c"]);
    }

    #[test]
    fn breaks() {
        assert!(is_break('\n', 'a', All));
        assert!(!is_break('\r', '\n', All));
        assert!(!is_break('a', '\n', All));
        assert!(!is_break('\r', 'a', NewlineOnly));
    }

    #[test]
    fn extents_of_each_line() {
        let mut buf = Buffer::new();
        buf.set_text("one\ntwo\nthree");

        let check = |off: usize, range: (usize, usize)| {
            let iter = buf.iter_at_offset(off).unwrap();
            let (s, e) = buf.paragraph_extents(&iter);
            assert_eq!((buf.offset_of(&s), buf.offset_of(&e)), range, "at {}", off);
        };

        check(0, (0, 4));
        check(3, (0, 4));
        check(4, (4, 8));
        check(10, (8, 13));
        check(13, (8, 13));
    }

    #[test]
    fn ids_differ_between_paragraphs() {
        let mut buf = Buffer::new();
        buf.set_text("a\nb");

        let a = buf.iter_at_offset(0).unwrap();
        let b = buf.iter_at_offset(2).unwrap();
        assert_ne!(buf.paragraph_id(&a), buf.paragraph_id(&b));
        assert_eq!(buf.paragraph_id(&a), buf.paragraph_id(&buf.iter_at_offset(1).unwrap()));

        let empty = Buffer::new();
        assert_eq!(empty.paragraph_id(&empty.bounds().0), None);
    }
}
