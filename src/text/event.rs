//! Change notifications: [`Event`], and the listeners that receive them
//!
//! Listeners are called synchronously, in the order they were connected, once an edit has fully
//! completed. They're given a shared reference to the buffer, so they can read anything they like
//! from it - including through the iterators in the event - but can't modify it.

use super::buffer::Buffer;
use super::Iter;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::ops::Range;

/// A change to the contents of a [`Buffer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    /// Text was inserted, and now lies between `start` and `end`
    Inserted {
        start: Iter,
        end: Iter,
        text: &'a str,
    },
    /// The text in `range` was removed, leaving the point where it used to be at `at`
    ///
    /// This is the only event for a deletion: it's sent once, after the removal has completed,
    /// and serves both as the notice that text is gone and as confirmation of where the edit
    /// ended up. `range` gives byte offsets as they were *before* the removal.
    Deleted { range: Range<usize>, at: Iter },
}

/// An identifier for a connected listener, used to disconnect it
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Box<dyn FnMut(&Buffer, &Event)>;

/// (*Internal*) The listeners connected to a buffer, in the order they were connected
#[derive(Default)]
pub(super) struct Listeners {
    list: Vec<(ListenerId, Callback)>,
    next_id: u64,
}

impl Debug for Listeners {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_list()
            .entries(self.list.iter().map(|(id, _)| id))
            .finish()
    }
}

impl Listeners {
    pub(super) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl Buffer {
    /// Connects a listener, which will be called after every insertion and deletion
    pub fn connect(&mut self, listener: impl FnMut(&Buffer, &Event) + 'static) -> ListenerId {
        let id = ListenerId(self.listeners.next_id);
        self.listeners.next_id += 1;
        self.listeners.list.push((id, Box::new(listener)));
        id
    }

    /// Disconnects the listener, returning whether it was connected
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.list.len();
        self.listeners.list.retain(|(i, _)| *i != id);
        before != self.listeners.list.len()
    }

    /// (*Internal*) Calls every listener with the event
    pub(super) fn emit(&mut self, event: &Event) {
        if self.listeners.is_empty() {
            return;
        }

        // The listeners are taken out while they run, so that each can borrow the buffer.
        let mut list = mem::take(&mut self.listeners.list);
        for (_, listener) in list.iter_mut() {
            listener(self, event);
        }
        self.listeners.list = list;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn called_in_connection_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut buf = Buffer::new();

        for name in &["first", "second"] {
            let log = log.clone();
            let name = *name;
            buf.connect(move |_, _| log.borrow_mut().push(name));
        }

        let (start, _) = buf.bounds();
        buf.insert(&start, "x");
        assert_eq!(*log.borrow(), ["first", "second"]);
    }

    #[test]
    fn disconnect_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let mut buf = Buffer::new();

        let c = count.clone();
        let id = buf.connect(move |_, _| *c.borrow_mut() += 1);

        let (start, _) = buf.bounds();
        buf.insert(&start, "a");
        assert!(buf.disconnect(id));
        assert!(!buf.disconnect(id));

        let (start, _) = buf.bounds();
        buf.insert(&start, "b");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn listeners_see_final_state() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut buf = Buffer::new();
        buf.set_text("Hello World");

        let s = seen.clone();
        buf.connect(move |buf, event| {
            let entry = match event {
                Event::Inserted { start, end, text } => {
                    format!("+{:?} {:?}", buf.text_range(start, end), text)
                }
                Event::Deleted { range, at } => {
                    format!("-{:?} at {}: {}", range, buf.offset_of(at), buf.text())
                }
            };
            s.borrow_mut().push(entry);
        });

        let a = buf.iter_at_offset(5).unwrap();
        let b = buf.iter_at_offset(11).unwrap();
        buf.delete(&a, &b);

        let (start, _) = buf.bounds();
        buf.insert(&start, ">> ");

        assert_eq!(
            *seen.borrow(),
            ["-5..11 at 5: Hello", "+\">> \" \">> \""]
        );
    }

    #[test]
    fn deletions_report_offsets_after_earlier_edits() {
        let ranges = Rc::new(RefCell::new(Vec::new()));
        let mut buf = Buffer::new();
        buf.set_text("one\ntwo\nthree");

        // Deleting with nobody listening still has to leave the buffer consistent
        let a = buf.iter_at_offset(0).unwrap();
        let b = buf.iter_at_offset(4).unwrap();
        buf.delete(&a, &b);
        assert_eq!(buf.text(), "two\nthree");

        let r = ranges.clone();
        buf.connect(move |_, event| {
            if let Event::Deleted { range, .. } = event {
                r.borrow_mut().push(range.clone());
            }
        });

        let mid = buf.iter_at_offset(4).unwrap();
        buf.insert(&mid, "and ");
        assert_eq!(buf.text(), "two\nand three");

        let a = buf.iter_at_offset(8).unwrap();
        let b = buf.iter_at_offset(13).unwrap();
        let at = buf.delete(&b, &a);
        assert_eq!(buf.text(), "two\nand ");
        assert_eq!(buf.offset_of(&at), 8);
        assert_eq!(*ranges.borrow(), [8..13]);
    }
}
