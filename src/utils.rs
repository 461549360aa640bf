//! Various basic utilites that are used in places throughout the crate
//!
//! This is more-or-less a miscellaneous collection.

/// A conversion trait that can be implemented for foreign types in either position
///
/// The configuration builders use this to produce their configuration; see the `config` macro.
pub trait XInto<T> {
    fn xinto(self) -> T;
}

pub trait XFrom<T> {
    fn xfrom(other: T) -> Self;
}

impl<T, S: XFrom<T>> XInto<S> for T {
    fn xinto(self) -> S {
        S::xfrom(self)
    }
}
