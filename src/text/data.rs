//! Per-range metadata: channels, their registry, and the values stored on nodes
//!
//! Any number of consumers may attach values to ranges of a [`Buffer`] without knowing about each
//! other. Each consumer registers a *channel* for the type of value it wants to store, and gets
//! back a typed [`Channel<T>`] handle; values are then set and read through that handle, so the
//! type is checked at compile time even though the storage underneath is type-erased.
//!
//! Values are stored per node, never per character. Setting a value over a range first splits the
//! nodes at the edges of the range, and merging only ever joins nodes whose values are
//! [identical](DataValue::identical).

use super::buffer::Buffer;
use super::iter::Pos;
use super::mark::Gravity;
use super::node::NodeKey;
use super::{BufferId, Error, Iter, OwnerId};
use smallvec::SmallVec;
use std::any::{self, Any, TypeId};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

/// The identifier of a single registered channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u32);

impl ChannelId {
    /// (*Internal*) The channel storing paragraph ids
    ///
    /// This is never handed out by the registry.
    pub(super) const PARAGRAPH: ChannelId = ChannelId(0);
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "channel #{}", self.0)
    }
}

/// A typed handle on a registered channel
///
/// This is produced by [`Buffer::register_data`], and is only valid for the buffer that produced
/// it, up until it is unregistered.
pub struct Channel<T> {
    id: ChannelId,
    buffer: BufferId,
    marker: PhantomData<fn() -> T>,
}

impl<T> Channel<T> {
    /// Returns the id of the channel
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Channel<T> {}

impl<T> PartialEq for Channel<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.buffer == other.buffer
    }
}

impl<T> Eq for Channel<T> {}

impl<T> Debug for Channel<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("type", &any::type_name::<T>())
            .finish()
    }
}

/// A value that can be stored in a channel
///
/// The only requirement beyond cloning is [`identical`], which decides whether two adjacent nodes
/// carrying these values may be merged. It is *not* equality: the test is whether the
/// stored representations are the same. For plain values, the representation is the value itself;
/// for shared objects (`Rc`, `Arc`), it's the pointer. Two distinct objects that happen to compare
/// equal are not identical, and nodes carrying them stay separate.
///
/// [`identical`]: Self::identical
pub trait DataValue: Clone + 'static {
    /// Returns whether the two values have the same stored representation
    fn identical(&self, other: &Self) -> bool;
}

macro_rules! identical_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DataValue for $ty {
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identical_by_value! {
    (), bool, char,
    u8, u16, u32, u64, u128, usize,
    i8, i16, i32, i64, i128, isize,
    &'static str,
}

#[rustfmt::skip]
impl DataValue for f32 {
    fn identical(&self, other: &Self) -> bool { self.to_bits() == other.to_bits() }
}

#[rustfmt::skip]
impl DataValue for f64 {
    fn identical(&self, other: &Self) -> bool { self.to_bits() == other.to_bits() }
}

impl<T: ?Sized + 'static> DataValue for Rc<T> {
    fn identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized + 'static> DataValue for Arc<T> {
    fn identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// (*Internal*) The type-erased form of a [`DataValue`], as stored on nodes
pub(super) trait ErasedValue {
    fn clone_box(&self) -> Box<dyn ErasedValue>;
    fn identical_dyn(&self, other: &dyn ErasedValue) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: DataValue> ErasedValue for T {
    fn clone_box(&self) -> Box<dyn ErasedValue> {
        Box::new(self.clone())
    }

    fn identical_dyn(&self, other: &dyn ErasedValue) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(o) => self.identical(o),
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// (*Internal*) The values attached to a single node, sorted by channel
///
/// Most nodes carry only a paragraph id and perhaps one or two other values, so these are kept
/// inline.
pub(super) struct DataSet(SmallVec<[(ChannelId, Box<dyn ErasedValue>); 2]>);

impl DataSet {
    /// Creates a set holding only the given paragraph id
    pub fn with_paragraph(id: u64) -> Self {
        let mut set = DataSet(SmallVec::new());
        set.set(ChannelId::PARAGRAPH, Some(Box::new(id)));
        set
    }

    pub fn get(&self, channel: ChannelId) -> Option<&dyn ErasedValue> {
        self.0
            .binary_search_by_key(&channel, |(c, _)| *c)
            .ok()
            .map(|idx| &*self.0[idx].1)
    }

    /// Sets or clears the value for the channel
    pub fn set(&mut self, channel: ChannelId, value: Option<Box<dyn ErasedValue>>) {
        match (self.0.binary_search_by_key(&channel, |(c, _)| *c), value) {
            (Ok(idx), Some(v)) => self.0[idx].1 = v,
            (Ok(idx), None) => drop(self.0.remove(idx)),
            (Err(idx), Some(v)) => self.0.insert(idx, (channel, v)),
            (Err(_), None) => (),
        }
    }

    /// Returns the paragraph id of the node
    ///
    /// ## Panics
    ///
    /// Every node carries a paragraph id; this panics if that isn't the case.
    pub fn paragraph(&self) -> u64 {
        match self
            .get(ChannelId::PARAGRAPH)
            .and_then(|v| v.as_any().downcast_ref::<u64>())
        {
            Some(&id) => id,
            None => panic!("node without a paragraph id"),
        }
    }

    pub fn set_paragraph(&mut self, id: u64) {
        self.set(ChannelId::PARAGRAPH, Some(Box::new(id)));
    }

    /// Returns whether the two sets hold the same channels with identical values
    pub fn identical(&self, other: &DataSet) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|((c, v), (d, w))| c == d && v.identical_dyn(&**w))
    }
}

impl Clone for DataSet {
    fn clone(&self) -> Self {
        DataSet(self.0.iter().map(|(c, v)| (*c, v.clone_box())).collect())
    }
}

/// (*Internal*) Returns whether the two optional values would allow merging
pub(super) fn identical_opt(a: Option<&dyn ErasedValue>, b: Option<&dyn ErasedValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.identical_dyn(b),
        _ => false,
    }
}

/// (*Internal*) The set of channels registered with a buffer
pub(super) struct Registry {
    channels: BTreeMap<ChannelId, Registration>,
    // Ids are never reused, so a stale `Channel` can't alias a newer one.
    next_id: u32,
}

struct Registration {
    owner: OwnerId,
    type_id: TypeId,
    type_name: &'static str,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            channels: BTreeMap::new(),
            next_id: ChannelId::PARAGRAPH.0 + 1,
        }
    }

    pub fn register<T: DataValue>(&mut self, owner: OwnerId) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;

        self.channels.insert(
            id,
            Registration {
                owner,
                type_id: TypeId::of::<T>(),
                type_name: any::type_name::<T>(),
            },
        );

        id
    }

    /// Checks that the channel exists and stores values of type `T`
    pub fn check<T: DataValue>(&self, id: ChannelId) -> Result<(), Error> {
        let reg = self
            .channels
            .get(&id)
            .ok_or(Error::InvalidChannel { id })?;

        if reg.type_id != TypeId::of::<T>() {
            return Err(Error::TypeMismatch {
                id,
                expected: reg.type_name,
                found: any::type_name::<T>(),
            });
        }

        Ok(())
    }

    pub fn unregister(&mut self, owner: OwnerId, id: ChannelId) -> Result<(), Error> {
        match self.channels.get(&id) {
            None => Err(Error::InvalidChannel { id }),
            Some(reg) if reg.owner != owner => Err(Error::ChannelOwnerMismatch { id }),
            Some(_) => {
                self.channels.remove(&id);
                Ok(())
            }
        }
    }

    /// Removes every channel belonging to the owner, returning their ids
    pub fn unregister_owner(&mut self, owner: OwnerId) -> Vec<ChannelId> {
        let ids: Vec<_> = self
            .channels
            .iter()
            .filter(|(_, reg)| reg.owner == owner)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            self.channels.remove(id);
        }

        ids
    }
}

//////////////////////////////////////////////////
// Buffer methods for registering and using data //
//////////////////////////////////////////////////

impl Buffer {
    /// Registers a new channel for values of type `T`, on behalf of `owner`
    ///
    /// The owner is responsible for eventually unregistering the channel, either directly with
    /// [`unregister_data`] or all at once with [`unregister_instance`]. Until then, the values
    /// stored in it live as long as the nodes carrying them.
    ///
    /// [`unregister_data`]: Self::unregister_data
    /// [`unregister_instance`]: Self::unregister_instance
    pub fn register_data<T: DataValue>(&mut self, owner: OwnerId) -> Channel<T> {
        let id = self.registry.register::<T>(owner);
        log::debug!(
            "registered {} for {} ({})",
            id,
            owner,
            any::type_name::<T>()
        );

        Channel {
            id,
            buffer: self.id,
            marker: PhantomData,
        }
    }

    /// Unregisters the channel, dropping every value stored in it
    ///
    /// ## Errors
    ///
    /// Fails if the channel doesn't belong to this buffer or has already been unregistered, or if
    /// it belongs to a different owner.
    pub fn unregister_data<T: DataValue>(
        &mut self,
        owner: OwnerId,
        channel: &Channel<T>,
    ) -> Result<(), Error> {
        if channel.buffer != self.id {
            return Err(Error::InvalidChannel { id: channel.id });
        }

        if let Err(e) = self.registry.unregister(owner, channel.id) {
            log::warn!("failed to unregister {}: {}", channel.id, e);
            return Err(e);
        }

        self.strip_channels(&[channel.id]);
        Ok(())
    }

    /// Unregisters every channel belonging to `owner`, returning how many there were
    pub fn unregister_instance(&mut self, owner: OwnerId) -> usize {
        let ids = self.registry.unregister_owner(owner);
        if !ids.is_empty() {
            log::debug!("unregistering {} channels for {}", ids.len(), owner);
            self.strip_channels(&ids);
        }

        ids.len()
    }

    /// (*Internal*) Removes the values for the channels from every node
    ///
    /// Clearing values may leave neighbouring nodes identical, so this finishes with a full merge
    /// pass.
    fn strip_channels(&mut self, ids: &[ChannelId]) {
        let keys = self.nodes.keys();
        for &key in &keys {
            let data = &mut self.nodes.get_mut(key).data;
            for &id in ids {
                data.set(id, None);
            }
        }

        for key in keys {
            self.try_merge(key);
        }

        self.bump_stamp();
    }

    /// (*Internal*) Checks that the channel belongs to this buffer and holds values of type `T`
    fn check_channel<T: DataValue>(&self, channel: &Channel<T>) -> Result<(), Error> {
        if channel.buffer != self.id {
            return Err(Error::InvalidChannel { id: channel.id });
        }

        self.registry.check::<T>(channel.id)
    }

    /// Returns the value stored for the character at `iter`
    ///
    /// At the end of the buffer, this gives the value of the last character instead. An empty
    /// buffer has no values.
    ///
    /// ## Errors
    ///
    /// Fails if the channel isn't registered with this buffer.
    ///
    /// ## Panics
    ///
    /// Panics if the iterator doesn't belong to this buffer or is out of date.
    pub fn get_data<T: DataValue>(
        &self,
        iter: &Iter,
        channel: &Channel<T>,
    ) -> Result<Option<&T>, Error> {
        let pos = self.check(iter);
        self.check_channel(channel)?;

        let node = match self.node_at_or_before(pos) {
            Some(n) => n,
            None => return Ok(None),
        };

        Ok(self
            .nodes
            .get(node)
            .data
            .get(channel.id)
            .and_then(|v| v.as_any().downcast_ref::<T>()))
    }

    /// Stores `value` on every character in the range between the two iterators, or clears the
    /// channel there if `value` is `None`
    ///
    /// The iterators may be given in either order. Nodes are split at both ends of the range if
    /// needed, and merged with their neighbours afterwards where the values allow it.
    ///
    /// Returns whether anything changed, along with the iterators for the start and end of the
    /// range; these are valid for the buffer as it is after the call. Nothing changes - and the
    /// given iterators stay valid - if the range is empty or already holds identical values.
    ///
    /// ## Errors
    ///
    /// Fails if the channel isn't registered with this buffer.
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn set_data<T: DataValue>(
        &mut self,
        start: &Iter,
        end: &Iter,
        channel: &Channel<T>,
        value: Option<T>,
    ) -> Result<(bool, Iter, Iter), Error> {
        let (a, b) = self.ordered(start, end);
        self.check_channel(channel)?;

        let value = value.map(|v| Box::new(v) as Box<dyn ErasedValue>);
        if a == b || self.range_holds(a, b, channel.id, value.as_deref()) {
            return Ok((false, self.make_iter(a), self.make_iter(b)));
        }

        log::trace!(
            "set {} over {}..{}",
            channel.id,
            self.offset_of_pos(a),
            self.offset_of_pos(b)
        );

        // Split the later position first, so that splitting the earlier one can't move it
        let end_node = self.split_at(b);
        let start_node = match self.split_at(a) {
            Some(n) => n,
            None => unreachable!("non-empty range starting at the end of the buffer"),
        };

        let start_mark = self.marks.insert(Pos::start_of(start_node), Gravity::Left, &self.nodes);
        let end_mark = self.marks.insert(
            Pos {
                node: end_node,
                offset: 0,
            },
            Gravity::Left,
            &self.nodes,
        );

        let mut touched = Vec::new();
        let mut cur = Some(start_node);
        while let Some(key) = cur {
            if Some(key) == end_node {
                break;
            }

            let data = &mut self.nodes.get_mut(key).data;
            data.set(channel.id, value.as_ref().map(|v| v.clone_box()));
            touched.push(key);
            cur = self.nodes.next(key);
        }
        touched.extend(end_node);

        for key in touched {
            self.try_merge(key);
        }

        let start_pos = self.marks.remove(start_mark, &self.nodes);
        let end_pos = self.marks.remove(end_mark, &self.nodes);
        self.bump_stamp();

        match (start_pos, end_pos) {
            (Some(s), Some(e)) => Ok((true, self.make_iter(s.pos), self.make_iter(e.pos))),
            _ => unreachable!("temporary marks removed during `set_data`"),
        }
    }

    /// (*Internal*) Returns whether every node overlapping `a..b` already holds `value` in the
    /// channel
    fn range_holds(
        &self,
        a: Pos,
        b: Pos,
        channel: ChannelId,
        value: Option<&dyn ErasedValue>,
    ) -> bool {
        let mut cur = a.node;
        while let Some(key) = cur {
            if Some(key) == b.node && b.offset == 0 {
                break;
            }

            if !identical_opt(self.nodes.get(key).data.get(channel), value) {
                return false;
            }

            if Some(key) == b.node {
                break;
            }
            cur = self.nodes.next(key);
        }

        true
    }

    /// Moves the iterator forward to the next point where the value in the channel changes,
    /// stopping at `limit`
    ///
    /// Returns `true` if such a point was found before `limit`. Otherwise, the iterator is left at
    /// `limit` - or where it was, if `limit` is behind it - and this returns `false`.
    ///
    /// ## Errors
    ///
    /// Fails if the channel isn't registered with this buffer.
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn iter_next_section<T: DataValue>(
        &self,
        iter: &mut Iter,
        limit: &Iter,
        channel: &Channel<T>,
    ) -> Result<bool, Error> {
        let pos = self.check(iter);
        let limit_pos = self.check(limit);
        self.check_channel(channel)?;

        if self.pos_key(limit_pos) <= self.pos_key(pos) {
            return Ok(false);
        }

        // `pos` can't be the end, because `limit` is after it
        let mut cur = match pos.node {
            Some(n) => n,
            None => return Ok(false),
        };

        while let Some(next) = self.nodes.next(cur) {
            let boundary = Pos::start_of(next);
            if self.pos_key(boundary) >= self.pos_key(limit_pos) {
                break;
            }

            if !self.same_section(cur, next, channel.id) {
                iter.pos = boundary;
                return Ok(true);
            }

            cur = next;
        }

        iter.pos = limit_pos;
        Ok(false)
    }

    /// Moves the iterator backward to the start of the section containing the character before
    /// it, stopping at `limit`
    ///
    /// Returns `true` if the section starts after `limit` and isn't the start of the buffer.
    /// Otherwise, the iterator is left at `limit` - or where it was, if `limit` is ahead of it -
    /// and this returns `false`.
    ///
    /// ## Errors
    ///
    /// Fails if the channel isn't registered with this buffer.
    ///
    /// ## Panics
    ///
    /// Panics if either iterator doesn't belong to this buffer or is out of date.
    pub fn iter_previous_section<T: DataValue>(
        &self,
        iter: &mut Iter,
        limit: &Iter,
        channel: &Channel<T>,
    ) -> Result<bool, Error> {
        let pos = self.check(iter);
        let limit_pos = self.check(limit);
        self.check_channel(channel)?;

        if self.pos_key(limit_pos) >= self.pos_key(pos) {
            return Ok(false);
        }

        let mut cur = match self.node_before(pos) {
            Some(n) => n,
            None => return Ok(false),
        };

        loop {
            let boundary = Pos::start_of(cur);
            if self.pos_key(boundary) <= self.pos_key(limit_pos) {
                break;
            }

            match self.nodes.prev(cur) {
                None => break,
                Some(prev) if !self.same_section(prev, cur, channel.id) => {
                    iter.pos = boundary;
                    return Ok(true);
                }
                Some(prev) => cur = prev,
            }
        }

        iter.pos = limit_pos;
        Ok(false)
    }

    /// (*Internal*) Returns whether the two nodes hold identical values in the channel
    fn same_section(&self, a: NodeKey, b: NodeKey, channel: ChannelId) -> bool {
        identical_opt(
            self.nodes.get(a).data.get(channel),
            self.nodes.get(b).data.get(channel),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Style {
        bold: bool,
    }

    #[test]
    fn scalar_identity_is_value_equality() {
        assert!(5_u32.identical(&5));
        assert!(!5_u32.identical(&6));
        assert!("x".identical(&"x"));
        assert!(1.5_f64.identical(&1.5));
        assert!(!0.0_f64.identical(&-0.0));
    }

    #[test]
    fn shared_identity_is_pointer_equality() {
        let a = Rc::new(Style { bold: true });
        let b = Rc::new(Style { bold: true });

        assert_eq!(a, b);
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));

        let c = Arc::new(Style { bold: false });
        assert!(c.identical(&Arc::clone(&c)));
    }

    #[test]
    fn erased_identity_checks_types() {
        let a: Box<dyn ErasedValue> = Box::new(3_u64);
        let b: Box<dyn ErasedValue> = Box::new(3_u32);
        let c: Box<dyn ErasedValue> = Box::new(3_u64);

        assert!(!a.identical_dyn(&*b));
        assert!(a.identical_dyn(&*c));
    }

    #[test]
    fn data_set_sorted() {
        let mut set = DataSet::with_paragraph(7);
        set.set(ChannelId(5), Some(Box::new("five")));
        set.set(ChannelId(2), Some(Box::new(2_i32)));

        let ids: Vec<_> = set.0.iter().map(|(c, _)| c.0).collect();
        assert_eq!(ids, [0, 2, 5]);
        assert_eq!(set.paragraph(), 7);

        set.set(ChannelId(2), None);
        assert!(set.get(ChannelId(2)).is_none());
        assert!(set.get(ChannelId(5)).is_some());
    }

    #[test]
    fn data_set_identity() {
        let shared = Rc::new(Style { bold: true });

        let mut a = DataSet::with_paragraph(1);
        a.set(ChannelId(1), Some(Box::new(shared.clone())));
        let b = a.clone();
        assert!(a.identical(&b));

        let mut c = DataSet::with_paragraph(1);
        c.set(ChannelId(1), Some(Box::new(Rc::new(Style { bold: true }))));
        assert!(!a.identical(&c));

        let d = DataSet::with_paragraph(1);
        assert!(!a.identical(&d));
    }

    #[test]
    fn registry_ownership() {
        let mut reg = Registry::new();
        let alice = OwnerId::random();
        let bob = OwnerId::random();

        let a = reg.register::<u32>(alice);
        let b = reg.register::<&'static str>(bob);
        assert_ne!(a, ChannelId::PARAGRAPH);
        assert_ne!(a, b);

        assert!(reg.check::<u32>(a).is_ok());
        assert!(matches!(
            reg.check::<u64>(a),
            Err(Error::TypeMismatch { .. })
        ));

        assert_eq!(
            reg.unregister(bob, a),
            Err(Error::ChannelOwnerMismatch { id: a })
        );
        assert_eq!(reg.unregister(alice, a), Ok(()));
        assert_eq!(reg.unregister(alice, a), Err(Error::InvalidChannel { id: a }));

        assert_eq!(reg.unregister_owner(bob), vec![b]);
        assert!(reg.unregister_owner(bob).is_empty());
    }
}
