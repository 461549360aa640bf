//! Wrapper module for [`NodeSeq`]
//!
//! The nodes of a buffer form a doubly-linked list stored in a [`SlotMap`], so that keys into it
//! are generation-checked: a key to a node that's since been removed can be detected instead of
//! silently pointing at something else.
//!
//! Alongside the links, each node carries an *order label*. Labels strictly increase along the
//! list, which allows any two positions to be compared without walking between them. A new node
//! takes the midpoint of its neighbours' labels; when there's no room left between them, the
//! whole list is relabelled evenly.

use super::chunk::{ChunkArena, ChunkSlice};
use super::data::DataSet;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// (*Internal*) The key for a single node in a [`NodeSeq`]
    pub(super) struct NodeKey;
}

/// (*Internal*) A single run of text, with the metadata attached to it
pub(super) struct Node {
    pub slice: ChunkSlice,
    pub data: DataSet,
    prev: Option<NodeKey>,
    next: Option<NodeKey>,
    order: u64,
}

impl Node {
    /// Returns the length of the node's text, in bytes
    pub fn len(&self) -> usize {
        self.slice.len()
    }
}

/// (*Internal*) The ordered sequence of nodes in a buffer
pub(super) struct NodeSeq {
    nodes: SlotMap<NodeKey, Node>,
    first: Option<NodeKey>,
    last: Option<NodeKey>,
    // The total length, in bytes
    len: usize,
}

/// The label standing in for the end of the buffer, greater than that of any node
pub(super) const END_ORDER: u64 = u64::MAX;

impl NodeSeq {
    pub fn new() -> Self {
        NodeSeq {
            nodes: SlotMap::with_key(),
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Returns the total length of the text in all nodes, in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of nodes
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node with the given key
    ///
    /// ## Panics
    ///
    /// Panics if the node has been removed.
    pub fn get(&self, key: NodeKey) -> &Node {
        &self.nodes[key]
    }

    /// Returns the node with the given key
    ///
    /// ## Panics
    ///
    /// Panics if the node has been removed.
    pub fn get_mut(&mut self, key: NodeKey) -> &mut Node {
        &mut self.nodes[key]
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn first(&self) -> Option<NodeKey> {
        self.first
    }

    pub fn last(&self) -> Option<NodeKey> {
        self.last
    }

    pub fn next(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].next
    }

    pub fn prev(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].prev
    }

    /// Returns the order label of the node, or [`END_ORDER`] for `None`
    pub fn order(&self, key: Option<NodeKey>) -> u64 {
        match key {
            Some(k) => self.nodes[k].order,
            None => END_ORDER,
        }
    }

    /// Returns the keys of every node, in order
    pub fn keys(&self) -> Vec<NodeKey> {
        let mut keys = Vec::with_capacity(self.nodes.len());
        let mut cur = self.first;
        while let Some(k) = cur {
            keys.push(k);
            cur = self.nodes[k].next;
        }
        keys
    }

    /// Produces an iterator over the nodes, in order
    pub fn iter(&self) -> NodeIter {
        NodeIter {
            seq: self,
            cur: self.first,
        }
    }

    /// Inserts a new node immediately before `before`, or at the end if `before` is `None`
    ///
    /// ## Panics
    ///
    /// Panics if the slice is empty; nodes never have zero length.
    pub fn insert_before(
        &mut self,
        before: Option<NodeKey>,
        slice: ChunkSlice,
        data: DataSet,
    ) -> NodeKey {
        assert!(slice.len() != 0, "attempted to insert an empty node");

        let prev = match before {
            Some(b) => self.nodes[b].prev,
            None => self.last,
        };

        // The start of the list is implicitly labelled zero; no node ever gets that label, because
        // the midpoint is always strictly above the lower bound.
        let lo = prev.map(|p| self.nodes[p].order).unwrap_or(0);
        let hi = self.order(before);
        let needs_relabel = hi - lo < 2;

        self.len += slice.len();
        let key = self.nodes.insert(Node {
            slice,
            data,
            prev,
            next: before,
            order: lo + (hi - lo) / 2,
        });

        match prev {
            Some(p) => self.nodes[p].next = Some(key),
            None => self.first = Some(key),
        }
        match before {
            Some(b) => self.nodes[b].prev = Some(key),
            None => self.last = Some(key),
        }

        if needs_relabel {
            self.relabel();
        }

        key
    }

    /// Spreads the order labels of all nodes evenly over the available range
    //
    // TODO-ALG: This is linear in the number of nodes. Relabelling only the smallest enclosing
    // range with enough room (as in Dietz & Sleator's order-maintenance scheme) would bring it
    // down to amortized logarithmic.
    fn relabel(&mut self) {
        let n = self.nodes.len() as u64;
        log::debug!("relabelling {} nodes", n);

        let spacing = END_ORDER / (n + 2);
        let mut label = spacing;
        let mut cur = self.first;
        while let Some(k) = cur {
            let node = &mut self.nodes[k];
            node.order = label;
            label += spacing;
            cur = node.next;
        }
    }

    /// Splits the node in two at the byte offset `at`, returning the key of the new right half
    ///
    /// Both halves keep the same metadata.
    ///
    /// ## Panics
    ///
    /// Panics if `at` isn't strictly within the node.
    pub fn split(&mut self, key: NodeKey, at: usize, arena: &mut ChunkArena) -> NodeKey {
        let node = &mut self.nodes[key];
        assert!(
            at > 0 && at < node.len(),
            "split at {} outside of node with length {}",
            at,
            node.len()
        );

        let upper = arena.split(&mut node.slice, at);
        let data = node.data.clone();
        let next = node.next;

        // `insert_before` counts the new slice towards the total length, but the bytes were
        // already there.
        self.len -= upper.len();
        self.insert_before(next, upper, data)
    }

    /// Unlinks and drops the node, releasing its text
    pub fn remove(&mut self, key: NodeKey, arena: &mut ChunkArena) {
        let node = match self.nodes.remove(key) {
            Some(n) => n,
            None => panic!("attempted to remove a node that doesn't exist"),
        };

        match node.prev {
            Some(p) => self.nodes[p].next = node.next,
            None => self.first = node.next,
        }
        match node.next {
            Some(n) => self.nodes[n].prev = node.prev,
            None => self.last = node.prev,
        }

        self.len -= node.len();
        arena.release(node.slice);
    }

    /// Returns whether the node could be merged into its predecessor
    ///
    /// This requires that the text of the two is adjacent within the same chunk, and that their
    /// metadata is identical.
    pub fn mergeable_with_prev(&self, key: NodeKey) -> bool {
        let node = &self.nodes[key];
        match node.prev {
            None => false,
            Some(p) => {
                let prev = &self.nodes[p];
                prev.slice.is_contiguous_with(&node.slice) && prev.data.identical(&node.data)
            }
        }
    }

    /// Merges the node into its predecessor, returning the predecessor's key
    ///
    /// The caller must have checked [`mergeable_with_prev`] beforehand.
    ///
    /// [`mergeable_with_prev`]: Self::mergeable_with_prev
    pub fn merge_into_prev(&mut self, key: NodeKey, arena: &mut ChunkArena) -> NodeKey {
        debug_assert!(self.mergeable_with_prev(key));

        let node = match self.nodes.remove(key) {
            Some(n) => n,
            None => panic!("attempted to merge a node that doesn't exist"),
        };
        let prev_key = match node.prev {
            Some(p) => p,
            None => panic!("attempted to merge the first node"),
        };

        match node.next {
            Some(n) => self.nodes[n].prev = Some(prev_key),
            None => self.last = Some(prev_key),
        }

        let prev = &mut self.nodes[prev_key];
        prev.next = node.next;
        if arena.try_join(&mut prev.slice, node.slice).is_err() {
            panic!("merged nodes with non-adjacent text");
        }

        prev_key
    }
}

/// An iterator over the nodes in a [`NodeSeq`], produced by [`NodeSeq::iter`]
pub(super) struct NodeIter<'a> {
    seq: &'a NodeSeq,
    cur: Option<NodeKey>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = (NodeKey, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cur?;
        let node = &self.seq.nodes[key];
        self.cur = node.next;
        Some((key, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn push(seq: &mut NodeSeq, arena: &mut ChunkArena, text: &str, para: u64) -> NodeKey {
        let slice = arena.new_chunk(text);
        seq.insert_before(None, slice, DataSet::with_paragraph(para))
    }

    fn texts(seq: &NodeSeq, arena: &ChunkArena) -> Vec<String> {
        seq.iter()
            .map(|(_, n)| arena.text(&n.slice).to_owned())
            .collect()
    }

    fn assert_ordered(seq: &NodeSeq) {
        let orders = seq.iter().map(|(_, n)| n.order).collect_vec();
        assert!(
            orders.iter().tuple_windows().all(|(a, b)| a < b),
            "labels out of order: {:?}",
            orders
        );
        assert!(orders.iter().all(|&o| o != 0 && o != END_ORDER));
    }

    #[test]
    fn insert_and_link() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        let b = push(&mut seq, &mut arena, "b", 0);
        let slice = arena.new_chunk("a");
        let a = seq.insert_before(Some(b), slice, DataSet::with_paragraph(0));
        push(&mut seq, &mut arena, "c", 0);

        assert_eq!(texts(&seq, &arena), ["a", "b", "c"]);
        assert_eq!(seq.first(), Some(a));
        assert_eq!(seq.next(a), Some(b));
        assert_eq!(seq.prev(b), Some(a));
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.count(), 3);
        assert_ordered(&seq);
    }

    #[test]
    fn relabel_when_crowded() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        // Always inserting at the front halves the gap each time, so this is guaranteed to run
        // out of room well before 200 nodes.
        let mut front = push(&mut seq, &mut arena, "x", 0);
        for _ in 0..200 {
            let slice = arena.new_chunk("x");
            front = seq.insert_before(Some(front), slice, DataSet::with_paragraph(0));
        }

        assert_eq!(seq.count(), 201);
        assert_eq!(seq.first(), Some(front));
        assert_ordered(&seq);
    }

    #[test]
    fn split_then_merge() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        let left = push(&mut seq, &mut arena, "Hello World", 0);
        let right = seq.split(left, 5, &mut arena);

        assert_eq!(texts(&seq, &arena), ["Hello", " World"]);
        assert_eq!(seq.len(), 11);
        assert!(seq.mergeable_with_prev(right));
        assert_ordered(&seq);

        assert_eq!(seq.merge_into_prev(right, &mut arena), left);
        assert_eq!(texts(&seq, &arena), ["Hello World"]);
        assert!(!seq.contains(right));
        assert_eq!(seq.last(), Some(left));
        assert_eq!(arena.refs(seq.get(left).slice.chunk()), 1);
    }

    #[test]
    fn differing_data_not_mergeable() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        let left = push(&mut seq, &mut arena, "ab", 0);
        let right = seq.split(left, 1, &mut arena);
        seq.get_mut(right).data.set_paragraph(1);

        assert!(!seq.mergeable_with_prev(right));
        assert!(!seq.mergeable_with_prev(left));
    }

    #[test]
    fn separate_chunks_not_mergeable() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        push(&mut seq, &mut arena, "ab", 0);
        let second = push(&mut seq, &mut arena, "cd", 0);
        assert!(!seq.mergeable_with_prev(second));
    }

    #[test]
    fn remove_releases_chunks() {
        let mut arena = ChunkArena::new(64);
        let mut seq = NodeSeq::new();

        let a = push(&mut seq, &mut arena, "abc", 0);
        let b = push(&mut seq, &mut arena, "def", 0);

        seq.remove(a, &mut arena);
        assert_eq!(arena.len(), 1);
        assert_eq!(seq.first(), Some(b));
        assert_eq!(seq.prev(b), None);
        assert_eq!(seq.len(), 3);

        seq.remove(b, &mut arena);
        assert_eq!(arena.len(), 0);
        assert_eq!(seq.first(), None);
        assert_eq!(seq.last(), None);
        assert_eq!(seq.len(), 0);
    }
}
