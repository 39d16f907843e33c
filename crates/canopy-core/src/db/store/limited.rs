use crate::{
    db::{key::Key, store::KeySource},
    error::InternalError,
};

///
/// LimitedCursor
///
/// Borrowing view of a positioned cursor that reports exhaustion once the
/// inner cursor moves past `limit`. The inner cursor keeps its position
/// after the view is dropped.
///

pub struct LimitedCursor<'a, S: ?Sized> {
    inner: &'a mut S,
    limit: Key,
}

impl<'a, S> LimitedCursor<'a, S>
where
    S: KeySource + ?Sized,
{
    pub const fn new(inner: &'a mut S, limit: Key) -> Self {
        Self { inner, limit }
    }

    #[must_use]
    pub const fn limit(&self) -> &Key {
        &self.limit
    }
}

impl<S> KeySource for LimitedCursor<'_, S>
where
    S: KeySource + ?Sized,
{
    fn has_next(&self) -> bool {
        self.peek_key().is_some()
    }

    fn peek_key(&self) -> Option<&Key> {
        self.inner.peek_key().filter(|key| *key <= &self.limit)
    }

    fn peek_value(&self) -> Option<&[u8]> {
        if self.has_next() {
            self.inner.peek_value()
        } else {
            None
        }
    }

    fn next(&mut self) -> Result<(), InternalError> {
        if !self.has_next() {
            return Err(InternalError::store_invariant(
                "limited cursor advanced past its limit",
            ));
        }

        self.inner.next()
    }
}
