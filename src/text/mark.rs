//! Wrapper module for [`MarkSet`], along with [`MarkId`] and [`Gravity`]
//!
//! Marks are positions that stay put across edits. They're stored as plain positions - a node and
//! an offset within it - and every operation that changes node boundaries calls one of the
//! `relocate_*` passes here to rewrite the marks it affects.
//!
//! All marks are also kept in a single vector sorted by document order, so that the marks on any
//! given node can be found with a binary search. None of the relocation passes ever reorder two
//! marks relative to each other, except for ties at the same position.

use super::iter::Pos;
use super::node::{NodeKey, NodeSeq};
use slotmap::SlotMap;
use std::ops::Range;

slotmap::new_key_type! {
    /// A unique identifier for a mark within a buffer
    ///
    /// Ids are never reused: after a mark is deleted, its id is simply invalid.
    pub struct MarkId;
}

/// The direction a mark leans when text is inserted exactly at its position
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Gravity {
    /// The mark stays before the inserted text
    Left,
    /// The mark ends up after the inserted text
    Right,
}

impl Default for Gravity {
    fn default() -> Self {
        Gravity::Left
    }
}

/// (*Internal*) A single mark
#[derive(Debug, Copy, Clone)]
pub(super) struct Mark {
    pub pos: Pos,
    pub gravity: Gravity,
}

/// (*Internal*) The set of marks in a buffer
///
/// Among marks at the same position, left-gravity marks always come first.
pub(super) struct MarkSet {
    marks: SlotMap<MarkId, Mark>,
    sorted: Vec<MarkId>,
}

impl MarkSet {
    pub fn new() -> Self {
        MarkSet {
            marks: SlotMap::with_key(),
            sorted: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn get(&self, id: MarkId) -> Option<&Mark> {
        self.marks.get(id)
    }

    /// Returns the range of indexes into `sorted` whose keys fall within `lo..hi`
    fn key_range(&self, lo: (u64, usize), hi: (u64, usize), nodes: &NodeSeq) -> Range<usize> {
        let start = self
            .sorted
            .partition_point(|&id| self.marks[id].pos.key(nodes) < lo);
        let end = start
            + self.sorted[start..].partition_point(|&id| self.marks[id].pos.key(nodes) < hi);
        start..end
    }

    /// Returns the range of indexes into `sorted` of marks at exactly `pos`
    fn at(&self, pos: Pos, nodes: &NodeSeq) -> Range<usize> {
        let (order, offset) = pos.key(nodes);
        self.key_range((order, offset), (order, offset + 1), nodes)
    }

    /// Returns the range of indexes into `sorted` of marks on the node at or after `from`
    fn on_node(&self, node: NodeKey, from: usize, nodes: &NodeSeq) -> Range<usize> {
        let order = nodes.order(Some(node));
        self.key_range((order, from), (order + 1, 0), nodes)
    }

    /// Adds a new mark, returning its id
    pub fn insert(&mut self, pos: Pos, gravity: Gravity, nodes: &NodeSeq) -> MarkId {
        let id = self.marks.insert(Mark { pos, gravity });
        self.place(id, nodes);
        id
    }

    /// (*Internal*) Inserts the mark into `sorted`, where its position and gravity put it
    fn place(&mut self, id: MarkId, nodes: &NodeSeq) {
        let mark = self.marks[id];
        let run = self.at(mark.pos, nodes);
        let idx = match mark.gravity {
            Gravity::Left => run.start,
            Gravity::Right => run.end,
        };
        self.sorted.insert(idx, id);
    }

    /// (*Internal*) Removes the mark from `sorted`, leaving it in `marks`
    fn unplace(&mut self, id: MarkId, nodes: &NodeSeq) {
        let run = self.at(self.marks[id].pos, nodes);
        match self.sorted[run.clone()].iter().position(|&m| m == id) {
            Some(i) => {
                self.sorted.remove(run.start + i);
            }
            None => unreachable!("mark missing from the sorted index"),
        }
    }

    /// Removes the mark, returning it if it existed
    pub fn remove(&mut self, id: MarkId, nodes: &NodeSeq) -> Option<Mark> {
        if !self.marks.contains_key(id) {
            return None;
        }

        self.unplace(id, nodes);
        self.marks.remove(id)
    }

    /// Moves the mark to a new position, returning whether it existed
    pub fn update(&mut self, id: MarkId, pos: Pos, nodes: &NodeSeq) -> bool {
        if !self.marks.contains_key(id) {
            return false;
        }

        self.unplace(id, nodes);
        self.marks[id].pos = pos;
        self.place(id, nodes);
        true
    }

    /// Rewrites marks after `node` has been split at `at`, with the upper half now in `right`
    pub fn relocate_split(&mut self, node: NodeKey, at: usize, right: NodeKey, nodes: &NodeSeq) {
        for idx in self.on_node(node, at, nodes) {
            let pos = &mut self.marks[self.sorted[idx]].pos;
            *pos = Pos {
                node: Some(right),
                offset: pos.offset - at,
            };
        }
    }

    /// Rewrites marks on `node` before it's merged into `pred`, which has length `pred_len`
    pub fn relocate_merge(
        &mut self,
        node: NodeKey,
        pred: NodeKey,
        pred_len: usize,
        nodes: &NodeSeq,
    ) {
        for idx in self.on_node(node, 0, nodes) {
            let pos = &mut self.marks[self.sorted[idx]].pos;
            *pos = Pos {
                node: Some(pred),
                offset: pred_len + pos.offset,
            };
        }
    }

    /// Collapses every mark from the start of `from` up to (but not including) `to` onto `to`
    ///
    /// This must be called before the nodes in the span are removed.
    pub fn relocate_span(&mut self, from: NodeKey, to: Pos, nodes: &NodeSeq) {
        let lo = Pos::start_of(from).key(nodes);
        let range = self.key_range(lo, to.key(nodes), nodes);
        if range.is_empty() {
            return;
        }

        log::trace!("collapsing {} marks", range.len());
        for idx in range.clone() {
            self.marks[self.sorted[idx]].pos = to;
        }

        // The collapsed marks now tie with any already at `to`
        let end = self.at(to, nodes).end;
        self.order_run(range.start..end);
    }

    /// Moves left-gravity marks at `at` onto `first_new`, the start of text just inserted before
    /// `at`
    pub fn relocate_insert(&mut self, at: Pos, first_new: NodeKey, nodes: &NodeSeq) {
        let run = self.at(at, nodes);
        self.order_run(run.clone());
        for idx in run {
            let mark = &mut self.marks[self.sorted[idx]];
            if mark.gravity == Gravity::Left {
                mark.pos = Pos::start_of(first_new);
            }
        }
    }

    /// (*Internal*) Stably reorders a run of marks at a single position so that left-gravity
    /// marks come first
    fn order_run(&mut self, run: Range<usize>) {
        let marks = &self.marks;
        self.sorted[run].sort_by_key(|&id| marks[id].gravity == Gravity::Right);
    }

    /// Returns whether `sorted` is correctly ordered
    #[cfg(test)]
    pub fn is_sorted(&self, nodes: &NodeSeq) -> bool {
        let key = |i: usize| self.marks[self.sorted[i]].pos.key(nodes);
        (1..self.sorted.len()).all(|i| {
            let (a, b) = (key(i - 1), key(i));
            a < b
                || (a == b
                    && !(self.marks[self.sorted[i - 1]].gravity == Gravity::Right
                        && self.marks[self.sorted[i]].gravity == Gravity::Left))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::chunk::ChunkArena;
    use super::super::data::DataSet;
    use super::*;

    fn setup(text: &str) -> (ChunkArena, NodeSeq, NodeKey) {
        let mut arena = ChunkArena::new(64);
        let mut nodes = NodeSeq::new();
        let slice = arena.new_chunk(text);
        let key = nodes.insert_before(None, slice, DataSet::with_paragraph(0));
        (arena, nodes, key)
    }

    fn pos(node: NodeKey, offset: usize) -> Pos {
        Pos {
            node: Some(node),
            offset,
        }
    }

    #[test]
    fn ties_put_left_first() {
        let (_arena, nodes, key) = setup("abc");
        let mut marks = MarkSet::new();

        let r = marks.insert(pos(key, 1), Gravity::Right, &nodes);
        let l = marks.insert(pos(key, 1), Gravity::Left, &nodes);
        let end = marks.insert(Pos::END, Gravity::Left, &nodes);
        let start = marks.insert(pos(key, 0), Gravity::Right, &nodes);

        assert_eq!(marks.sorted, [start, l, r, end]);
        assert!(marks.is_sorted(&nodes));
    }

    #[test]
    fn split_moves_upper_marks() {
        let (mut arena, mut nodes, key) = setup("Hello World");
        let mut marks = MarkSet::new();

        let before = marks.insert(pos(key, 2), Gravity::Left, &nodes);
        let at = marks.insert(pos(key, 5), Gravity::Left, &nodes);
        let after = marks.insert(pos(key, 8), Gravity::Left, &nodes);

        let right = nodes.split(key, 5, &mut arena);
        marks.relocate_split(key, 5, right, &nodes);

        assert_eq!(marks.get(before).unwrap().pos, pos(key, 2));
        assert_eq!(marks.get(at).unwrap().pos, pos(right, 0));
        assert_eq!(marks.get(after).unwrap().pos, pos(right, 3));
        assert!(marks.is_sorted(&nodes));
    }

    #[test]
    fn merge_moves_onto_predecessor() {
        let (mut arena, mut nodes, key) = setup("Hello World");
        let right = nodes.split(key, 5, &mut arena);
        let mut marks = MarkSet::new();

        let m = marks.insert(pos(right, 3), Gravity::Right, &nodes);
        marks.relocate_merge(right, key, 5, &nodes);
        nodes.merge_into_prev(right, &mut arena);

        assert_eq!(marks.get(m).unwrap().pos, pos(key, 8));
        assert!(marks.is_sorted(&nodes));
    }

    #[test]
    fn span_collapses_and_keeps_order() {
        let (mut arena, mut nodes, key) = setup("abcdef");
        let mid = nodes.split(key, 2, &mut arena);
        let tail = nodes.split(mid, 2, &mut arena);
        let mut marks = MarkSet::new();

        let outside = marks.insert(pos(key, 1), Gravity::Left, &nodes);
        let inside_r = marks.insert(pos(mid, 0), Gravity::Right, &nodes);
        let inside_l = marks.insert(pos(mid, 1), Gravity::Left, &nodes);
        let at_tail = marks.insert(pos(tail, 0), Gravity::Left, &nodes);

        marks.relocate_span(mid, pos(tail, 0), &nodes);
        nodes.remove(mid, &mut arena);

        for &m in &[inside_r, inside_l, at_tail] {
            assert_eq!(marks.get(m).unwrap().pos, pos(tail, 0));
        }
        assert_eq!(marks.get(outside).unwrap().pos, pos(key, 1));
        assert!(marks.is_sorted(&nodes));
        assert_eq!(*marks.sorted.last().unwrap(), inside_r);
    }

    #[test]
    fn update_and_remove() {
        let (_arena, nodes, key) = setup("abc");
        let mut marks = MarkSet::new();

        let a = marks.insert(pos(key, 0), Gravity::Left, &nodes);
        let b = marks.insert(pos(key, 2), Gravity::Left, &nodes);

        assert!(marks.update(a, Pos::END, &nodes));
        assert_eq!(marks.sorted, [b, a]);

        assert!(marks.remove(a, &nodes).is_some());
        assert!(marks.remove(a, &nodes).is_none());
        assert!(!marks.update(a, Pos::END, &nodes));
        assert_eq!(marks.len(), 1);
    }
}
