//! Module: db::store
//! Responsibility: raw sorted-cursor contracts and the in-memory store.
//! Does not own: document semantics or index layouts.
//! Boundary: every higher layer reads stored cells through `SortedKeyCursor`.

mod filtered;
mod limited;
mod memory;


use crate::{
    db::key::{Key, Range},
    error::InternalError,
};

pub use filtered::FilteredCursor;
pub use limited::LimitedCursor;
pub use memory::{MemoryCursor, MemoryStore};

///
/// KeySource
///
/// Pull-based read side of a positioned cursor.
/// `peek_*` observe the current entry; `next` advances past it.
///

pub trait KeySource {
    fn has_next(&self) -> bool;

    fn peek_key(&self) -> Option<&Key>;

    fn peek_value(&self) -> Option<&[u8]>;

    fn next(&mut self) -> Result<(), InternalError>;
}

///
/// SortedKeyCursor
///
/// Seekable cursor over one sorted store.
/// `deep_copy` yields an independent cursor sharing no mutable state.
///

pub trait SortedKeyCursor: KeySource + Send {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError>;

    fn deep_copy(&self) -> Box<dyn SortedKeyCursor>;
}

pub type SortedKeyCursorBox = Box<dyn SortedKeyCursor>;

impl<T> KeySource for Box<T>
where
    T: KeySource + ?Sized,
{
    fn has_next(&self) -> bool {
        self.as_ref().has_next()
    }

    fn peek_key(&self) -> Option<&Key> {
        self.as_ref().peek_key()
    }

    fn peek_value(&self) -> Option<&[u8]> {
        self.as_ref().peek_value()
    }

    fn next(&mut self) -> Result<(), InternalError> {
        self.as_mut().next()
    }
}

impl<T> KeySource for &mut T
where
    T: KeySource + ?Sized,
{
    fn has_next(&self) -> bool {
        (**self).has_next()
    }

    fn peek_key(&self) -> Option<&Key> {
        (**self).peek_key()
    }

    fn peek_value(&self) -> Option<&[u8]> {
        (**self).peek_value()
    }

    fn next(&mut self) -> Result<(), InternalError> {
        (**self).next()
    }
}
